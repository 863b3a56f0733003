//! Validator withdrawal-credential proof verifier.
//!
//! Holds the oracle-published state roots and checks that
//! `hash_pair(pubkey_hash, withdrawal_credentials)` sits at the validator's
//! position under the root of a given slot. Failed verification through
//! [`VerifierRequest::VerifyValidator`] is a hard rejection, never a soft
//! `false` reply.

use crate::contract::Contract;
use crate::error::VerifierError;
use crate::gindex::GindexCalculator;
use crate::hash::{compute_leaf_hash, hash_pair};
use crate::registry::StateRootRegistry;
use crate::replay::ReplayGuard;
use crate::types::{
    branch_serde, hex_bytes32, Address, Envelope, Hash32, Outbound, RequestId, Slot,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Tree-addressing convention for validator leaves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofConfig {
    /// Identity allowed to publish state roots
    pub oracle: Address,
    /// Gindex of validator 0
    pub first_validator_gindex: u64,
    /// Depth of the validator layer
    pub first_validator_depth: u32,
}

impl ProofConfig {
    /// Beacon-state convention: validators\[0\] under the state root
    #[must_use]
    pub fn beacon_state(oracle: Address) -> Self {
        Self {
            oracle,
            first_validator_gindex: GindexCalculator::first_validator_gindex(),
            first_validator_depth: GindexCalculator::first_validator_depth(),
        }
    }
}

/// Inclusion claim for one validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorProof {
    #[serde(with = "hex_bytes32")]
    pub pubkey_hash: Hash32,
    #[serde(with = "hex_bytes32")]
    pub withdrawal_credentials: Hash32,
    pub validator_index: u64,
    pub slot: Slot,
    /// Sibling hashes keyed by step, leaf level first
    #[serde(with = "branch_serde")]
    pub branch: BTreeMap<u32, Hash32>,
    pub proof_length: u32,
}

/// Requests accepted by the verifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifierRequest {
    /// Owner only
    SetOracle { oracle: Address },
    /// Owner only
    SetFirstValidatorGIndex { gindex: u64, depth: u32 },
    /// Oracle only
    SetStateRoot {
        slot: Slot,
        #[serde(with = "hex_bytes32")]
        root: Hash32,
    },
    /// Anyone
    VerifyValidator(ValidatorProof),
}

/// Messages the verifier sends out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifierNotification {
    /// Sent back to the caller of a successful `VerifyValidator`
    VerifyResult {
        request_id: RequestId,
        #[serde(with = "hex_bytes32")]
        pubkey_hash: Hash32,
        validator_index: u64,
        slot: Slot,
        valid: bool,
    },
}

/// Walk `branch` from `leaf` at generalized index `position` and compare with `root`.
///
/// At each step an even index hashes `(current, sibling)` and an odd index
/// hashes `(sibling, current)`. A missing sibling fails the proof.
#[must_use]
pub fn verify_branch(
    leaf: &Hash32,
    position: u64,
    branch: &BTreeMap<u32, Hash32>,
    proof_length: u32,
    root: &Hash32,
) -> bool {
    let mut current = *leaf;
    let mut index = position;

    for step in 0..proof_length {
        let Some(sibling) = branch.get(&step) else {
            return false;
        };
        current = if index % 2 == 0 {
            hash_pair(&current, sibling)
        } else {
            hash_pair(sibling, &current)
        };
        index /= 2;
    }

    current == *root
}

/// State-root registry plus proof verification
#[derive(Debug, Clone)]
pub struct ClProofVerifier {
    owner: Address,
    config: ProofConfig,
    registry: StateRootRegistry,
    replay: ReplayGuard,
}

impl ClProofVerifier {
    /// Create a verifier owned by `owner`.
    ///
    /// # Errors
    /// Returns [`VerifierError::InvalidArgument`] for a zero gindex or a
    /// depth that is not the depth of the gindex.
    pub fn new(owner: Address, config: ProofConfig) -> Result<Self, VerifierError> {
        ensure_layer(config.first_validator_gindex, config.first_validator_depth)?;
        Ok(Self {
            owner,
            config,
            registry: StateRootRegistry::new(),
            replay: ReplayGuard::new(),
        })
    }

    #[must_use]
    pub const fn owner(&self) -> Address {
        self.owner
    }

    #[must_use]
    pub const fn oracle(&self) -> Address {
        self.config.oracle
    }

    #[must_use]
    pub const fn first_validator_gindex(&self) -> u64 {
        self.config.first_validator_gindex
    }

    #[must_use]
    pub const fn first_validator_depth(&self) -> u32 {
        self.config.first_validator_depth
    }

    #[must_use]
    pub const fn config(&self) -> &ProofConfig {
        &self.config
    }

    /// Root published for `slot`
    #[must_use]
    pub fn state_root(&self, slot: Slot) -> Option<Hash32> {
        self.registry.get(slot)
    }

    #[must_use]
    pub fn is_processed(&self, request_id: RequestId) -> bool {
        self.replay.is_processed(request_id)
    }

    /// Pure leaf computation, same as [`compute_leaf_hash`]
    #[must_use]
    pub fn compute_leaf_hash(
        &self,
        pubkey_hash: &Hash32,
        withdrawal_credentials: &Hash32,
    ) -> Hash32 {
        compute_leaf_hash(pubkey_hash, withdrawal_credentials)
    }

    /// Dry-run verification. Never changes state and never errors:
    /// an unknown slot, a missing sibling or a position outside the
    /// configured validator layer all answer `false`.
    #[must_use]
    pub fn verify_proof(&self, proof: &ValidatorProof) -> bool {
        let Some(root) = self.registry.get(proof.slot) else {
            return false;
        };
        let leaf = compute_leaf_hash(&proof.pubkey_hash, &proof.withdrawal_credentials);

        if proof.proof_length == 0 {
            return leaf == root;
        }

        let Some(position) = GindexCalculator::validator_position(
            self.config.first_validator_gindex,
            proof.validator_index,
        ) else {
            return false;
        };
        if GindexCalculator::gindex_depth(position) != self.config.first_validator_depth {
            debug!(
                position,
                depth = self.config.first_validator_depth,
                "Position outside validator layer"
            );
            return false;
        }

        verify_branch(&leaf, position, &proof.branch, proof.proof_length, &root)
    }

    fn ensure_owner(&self, sender: Address) -> Result<(), VerifierError> {
        if sender != self.owner {
            return Err(VerifierError::Unauthorized {
                sender,
                role: "owner",
            });
        }
        Ok(())
    }

    fn ensure_oracle(&self, sender: Address) -> Result<(), VerifierError> {
        if sender != self.config.oracle {
            return Err(VerifierError::Unauthorized {
                sender,
                role: "oracle",
            });
        }
        Ok(())
    }
}

/// The validator layer must start at a real node and sit at that node's depth
fn ensure_layer(gindex: u64, depth: u32) -> Result<(), VerifierError> {
    if gindex == 0 {
        return Err(VerifierError::InvalidArgument(
            "first validator gindex must be non-zero".to_string(),
        ));
    }
    let expected = GindexCalculator::gindex_depth(gindex);
    if depth != expected {
        return Err(VerifierError::InvalidArgument(format!(
            "gindex {gindex} lives at depth {expected}, not {depth}"
        )));
    }
    Ok(())
}

impl Contract for ClProofVerifier {
    type Request = VerifierRequest;
    type Notification = VerifierNotification;
    type Error = VerifierError;

    fn name(&self) -> &'static str {
        "verifier"
    }

    fn handle(
        &mut self,
        msg: Envelope<VerifierRequest>,
    ) -> Result<Vec<Outbound<VerifierNotification>>, VerifierError> {
        let Envelope {
            sender,
            request_id,
            body,
        } = msg;
        self.replay.ensure_fresh(request_id)?;

        let outbound = match body {
            VerifierRequest::SetOracle { oracle } => {
                self.ensure_owner(sender)?;
                info!(%oracle, previous = %self.config.oracle, "Oracle replaced");
                self.config.oracle = oracle;
                Vec::new()
            }
            VerifierRequest::SetFirstValidatorGIndex { gindex, depth } => {
                self.ensure_owner(sender)?;
                ensure_layer(gindex, depth)?;
                info!(gindex, depth, "First validator gindex updated");
                self.config.first_validator_gindex = gindex;
                self.config.first_validator_depth = depth;
                Vec::new()
            }
            VerifierRequest::SetStateRoot { slot, root } => {
                self.ensure_oracle(sender)?;
                self.registry.publish(slot, root)?;
                info!(slot, root = %hex::encode(root), "State root published");
                Vec::new()
            }
            VerifierRequest::VerifyValidator(proof) => {
                if !self.registry.contains(proof.slot) {
                    return Err(VerifierError::UnknownSlot(proof.slot));
                }
                if !self.verify_proof(&proof) {
                    warn!(
                        validator_index = proof.validator_index,
                        slot = proof.slot,
                        "Validator proof rejected"
                    );
                    return Err(VerifierError::ProofRejected {
                        validator_index: proof.validator_index,
                        slot: proof.slot,
                    });
                }
                info!(
                    validator_index = proof.validator_index,
                    slot = proof.slot,
                    "Validator proof verified"
                );
                vec![Outbound {
                    delivery_id: request_id,
                    to: sender,
                    body: VerifierNotification::VerifyResult {
                        request_id,
                        pubkey_hash: proof.pubkey_hash,
                        validator_index: proof.validator_index,
                        slot: proof.slot,
                        valid: true,
                    },
                }]
            }
        };

        self.replay.consume(request_id);
        Ok(outbound)
    }

    fn on_delivery_failed(
        &mut self,
        failed: &Outbound<VerifierNotification>,
    ) -> Result<(), VerifierError> {
        // Notifications carry no value; nothing to reconcile.
        warn!(delivery_id = failed.delivery_id, to = %failed.to, "Verify result undeliverable");
        Ok(())
    }
}
