//! Shared fixtures for the end-to-end tests
//!
//! Named identities, the four-leaf sample tree and a [`Harness`] that runs
//! both entities as actors behind a scriptable transport.

use cl_proof::hash::word_from_u128;
use cl_proof::sparse_proof::build_witness;
use cl_proof::{
    hash_pair, Address, ClProofVerifier, DeliveryId, Hash32, ProofConfig, Slot, ValidatorProof,
};
use parking_lot::Mutex;
use pdg_service::actor::spawn;
use pdg_service::{ActorHandle, AppState, DeliveryError, Dispatcher, Transport};
use predeposit_guarantee::PredepositGuarantee;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub fn owner() -> Address {
    Address::from_label("owner")
}

pub fn oracle() -> Address {
    Address::from_label("oracle")
}

pub fn admin() -> Address {
    Address::from_label("admin")
}

pub fn proof_authority() -> Address {
    Address::from_label("proofVerifier")
}

pub fn node_operator() -> Address {
    Address::from_label("nodeOperator")
}

pub fn guarantor() -> Address {
    Address::from_label("guarantor")
}

pub fn vault() -> Address {
    Address::from_label("vault")
}

pub fn relayer() -> Address {
    Address::from_label("relayer")
}

/// Validator layer at gindex 8 (depth 3)
pub fn proof_config() -> ProofConfig {
    ProofConfig {
        oracle: oracle(),
        first_validator_gindex: 8,
        first_validator_depth: 3,
    }
}

/// Four leaves with `H(0xABCD, 0x1234)` at index 1
pub fn sample_leaves() -> Vec<Hash32> {
    let pair = |a, b| hash_pair(&word_from_u128(a), &word_from_u128(b));
    vec![
        pair(0x1111, 0x2222),
        pair(0xABCD, 0x1234),
        pair(0x3333, 0x4444),
        pair(0x5555, 0x6666),
    ]
}

/// Proof for leaf 1 of [`sample_leaves`] at `slot`, with the tree root
pub fn sample_proof(slot: Slot) -> (ValidatorProof, Hash32) {
    let witness = build_witness(&sample_leaves(), 1).expect("leaf 1 exists");
    let proof = ValidatorProof {
        pubkey_hash: word_from_u128(0xABCD),
        withdrawal_credentials: word_from_u128(0x1234),
        validator_index: 1,
        slot,
        branch: witness.branch,
        proof_length: witness.depth,
    };
    (proof, witness.root)
}

/// One delivery attempt seen by [`ScriptedTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub to: Address,
    pub delivery_id: DeliveryId,
    pub payload: serde_json::Value,
    pub accepted: bool,
}

/// Transport that refuses a chosen set of recipients and logs every attempt
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    refused: Mutex<HashSet<Address>>,
    attempts: Mutex<Vec<Attempt>>,
}

impl ScriptedTransport {
    pub fn refuse(&self, to: Address) {
        self.refused.lock().insert(to);
    }

    pub fn accept(&self, to: &Address) {
        self.refused.lock().remove(to);
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.attempts.lock().clone()
    }
}

impl Transport for ScriptedTransport {
    fn deliver(
        &self,
        to: &Address,
        delivery_id: DeliveryId,
        payload: &serde_json::Value,
    ) -> Result<(), DeliveryError> {
        let accepted = !self.refused.lock().contains(to);
        self.attempts.lock().push(Attempt {
            to: *to,
            delivery_id,
            payload: payload.clone(),
            accepted,
        });
        if accepted {
            Ok(())
        } else {
            Err(DeliveryError {
                to: *to,
                delivery_id,
                reason: "recipient refused".to_string(),
            })
        }
    }
}

/// Both entities running as actors on a shared [`AppState`]
pub struct Harness {
    pub state: AppState,
    pub transport: Arc<ScriptedTransport>,
    pub verifier: ActorHandle<ClProofVerifier>,
    pub guarantee: ActorHandle<PredepositGuarantee>,
}

impl Harness {
    /// Spawn the actors; must be called inside a tokio runtime
    pub fn start() -> Self {
        let state = AppState::new();
        let transport = Arc::new(ScriptedTransport::default());
        let dispatcher = Dispatcher::new(transport.clone(), state.clone());

        let verifier = ClProofVerifier::new(owner(), proof_config())
            .expect("sample gindex is valid");
        let (verifier, _) = spawn(verifier, dispatcher.clone(), state.clone());
        let (guarantee, _) = spawn(
            PredepositGuarantee::new(admin(), proof_authority()),
            dispatcher,
            state.clone(),
        );

        Self {
            state,
            transport,
            verifier,
            guarantee,
        }
    }

    /// Wait until every payout of the escrow has been settled or reconciled
    pub async fn settle(&self) {
        for _ in 0..200 {
            let pending = self
                .guarantee
                .query(|g| g.in_flight_count())
                .await
                .expect("guarantee actor is running");
            if pending == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("payouts still in flight");
    }
}
