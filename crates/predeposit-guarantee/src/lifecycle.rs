//! Validator lifecycle records
//!
//! ```text
//! None --predeposit--> Predeposited --proven valid---> Activated   (terminal)
//!                      Predeposited --proven invalid-> Compensated (terminal)
//! ```

use crate::error::PdgError;
use cl_proof::{hex_bytes32, Address, Hash32};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stage of one validator. Numeric codes are stable; 2 is reserved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ValidatorStage {
    #[default]
    None = 0,
    Predeposited = 1,
    Activated = 3,
    Compensated = 4,
}

impl ValidatorStage {
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Activated | Self::Compensated)
    }
}

/// Everything the escrow knows about a predeposited validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRecord {
    #[serde(with = "hex_bytes32")]
    pub pubkey_hash: Hash32,
    pub stage: ValidatorStage,
    pub staking_vault: Address,
    pub node_operator: Address,
    /// The predeposit lock taken for this validator is still held in the
    /// operator's bond. Cleared once the lock is settled or refunded away.
    pub bond_locked: bool,
    /// Proof reference supplied with the final transition
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_hex")]
    pub proof_hash: Option<Hash32>,
}

/// Records keyed by pubkey hash, plus pending counts per staking vault
#[derive(Debug, Clone, Default)]
pub struct ValidatorLifecycle {
    records: HashMap<Hash32, ValidatorRecord>,
    pending: HashMap<Address, u64>,
}

impl ValidatorLifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stage(&self, pubkey_hash: &Hash32) -> ValidatorStage {
        self.records
            .get(pubkey_hash)
            .map_or(ValidatorStage::None, |r| r.stage)
    }

    #[must_use]
    pub fn record(&self, pubkey_hash: &Hash32) -> Option<&ValidatorRecord> {
        self.records.get(pubkey_hash)
    }

    /// Predeposited validators still waiting on a proof for `staking_vault`
    #[must_use]
    pub fn pending_activations(&self, staking_vault: &Address) -> u64 {
        self.pending.get(staking_vault).copied().unwrap_or(0)
    }

    /// # Errors
    /// [`PdgError::DuplicateValidator`] if any record exists for the key.
    pub fn ensure_new(&self, pubkey_hash: &Hash32) -> Result<(), PdgError> {
        if self.records.contains_key(pubkey_hash) {
            return Err(PdgError::DuplicateValidator(*pubkey_hash));
        }
        Ok(())
    }

    /// # Errors
    /// [`PdgError::InvalidStateTransition`] unless the validator is predeposited.
    pub fn ensure_predeposited(&self, pubkey_hash: &Hash32) -> Result<&ValidatorRecord, PdgError> {
        match self.records.get(pubkey_hash) {
            Some(record) if record.stage == ValidatorStage::Predeposited => Ok(record),
            other => Err(PdgError::InvalidStateTransition {
                pubkey_hash: *pubkey_hash,
                from: other.map_or(ValidatorStage::None, |r| r.stage),
            }),
        }
    }

    /// Create the record in the predeposited stage.
    ///
    /// # Errors
    /// [`PdgError::DuplicateValidator`].
    pub fn predeposit(
        &mut self,
        pubkey_hash: Hash32,
        staking_vault: Address,
        node_operator: Address,
    ) -> Result<(), PdgError> {
        self.ensure_new(&pubkey_hash)?;
        self.records.insert(
            pubkey_hash,
            ValidatorRecord {
                pubkey_hash,
                stage: ValidatorStage::Predeposited,
                staking_vault,
                node_operator,
                bond_locked: true,
                proof_hash: None,
            },
        );
        *self.pending.entry(staking_vault).or_default() += 1;
        Ok(())
    }

    /// Move a predeposited validator to a terminal stage and return the
    /// updated record.
    ///
    /// # Errors
    /// [`PdgError::InvalidStateTransition`] unless the validator is
    /// predeposited, or [`PdgError::InvalidArgument`] for a non-terminal target.
    pub fn finish(
        &mut self,
        pubkey_hash: &Hash32,
        to: ValidatorStage,
        proof_hash: Hash32,
    ) -> Result<ValidatorRecord, PdgError> {
        if !to.is_terminal() {
            return Err(PdgError::InvalidArgument(format!(
                "{to:?} is not a terminal stage"
            )));
        }
        let vault = self.ensure_predeposited(pubkey_hash)?.staking_vault;

        if let Some(count) = self.pending.get_mut(&vault) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.pending.remove(&vault);
            }
        }

        let record = self
            .records
            .get_mut(pubkey_hash)
            .ok_or(PdgError::InvalidStateTransition {
                pubkey_hash: *pubkey_hash,
                from: ValidatorStage::None,
            })?;
        record.stage = to;
        record.bond_locked = false;
        record.proof_hash = Some(proof_hash);
        Ok(record.clone())
    }

    /// Mark every pending validator of `node_operator` as no longer backed
    /// by a lock. Returns how many records changed.
    pub fn release_bond_backing(&mut self, node_operator: &Address) -> usize {
        let mut changed = 0;
        for record in self.records.values_mut() {
            if record.node_operator == *node_operator
                && record.stage == ValidatorStage::Predeposited
                && record.bond_locked
            {
                record.bond_locked = false;
                changed += 1;
            }
        }
        changed
    }
}

mod opt_hex {
    use cl_proof::{hex_bytes32, Hash32};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Hash32>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => hex_bytes32::serialize(bytes, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Hash32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wrapped(#[serde(with = "hex_bytes32")] Hash32);

        Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|Wrapped(bytes)| bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> Address {
        Address::from_label("stakingVault")
    }

    fn operator() -> Address {
        Address::from_label("nodeOperator")
    }

    #[test]
    fn test_stage_codes() {
        assert_eq!(ValidatorStage::None.code(), 0);
        assert_eq!(ValidatorStage::Predeposited.code(), 1);
        assert_eq!(ValidatorStage::Activated.code(), 3);
        assert_eq!(ValidatorStage::Compensated.code(), 4);
        assert!(!ValidatorStage::Predeposited.is_terminal());
    }

    #[test]
    fn test_predeposit_once() {
        let mut lifecycle = ValidatorLifecycle::new();
        lifecycle.predeposit([1; 32], vault(), operator()).unwrap();
        assert_eq!(lifecycle.stage(&[1; 32]), ValidatorStage::Predeposited);
        assert_eq!(lifecycle.pending_activations(&vault()), 1);

        let err = lifecycle.predeposit([1; 32], vault(), operator()).unwrap_err();
        assert_eq!(err, PdgError::DuplicateValidator([1; 32]));
        assert_eq!(lifecycle.pending_activations(&vault()), 1);
    }

    #[test]
    fn test_finish_decrements_pending() {
        let mut lifecycle = ValidatorLifecycle::new();
        lifecycle.predeposit([1; 32], vault(), operator()).unwrap();
        lifecycle.predeposit([2; 32], vault(), operator()).unwrap();

        let record = lifecycle
            .finish(&[1; 32], ValidatorStage::Activated, [9; 32])
            .unwrap();
        assert_eq!(record.stage, ValidatorStage::Activated);
        assert_eq!(record.proof_hash, Some([9; 32]));
        assert_eq!(lifecycle.pending_activations(&vault()), 1);

        lifecycle
            .finish(&[2; 32], ValidatorStage::Compensated, [9; 32])
            .unwrap();
        assert_eq!(lifecycle.pending_activations(&vault()), 0);
    }

    #[test]
    fn test_terminal_stages_cannot_move() {
        let mut lifecycle = ValidatorLifecycle::new();
        lifecycle.predeposit([1; 32], vault(), operator()).unwrap();
        lifecycle
            .finish(&[1; 32], ValidatorStage::Activated, [0; 32])
            .unwrap();

        let err = lifecycle
            .finish(&[1; 32], ValidatorStage::Compensated, [0; 32])
            .unwrap_err();
        assert_eq!(
            err,
            PdgError::InvalidStateTransition {
                pubkey_hash: [1; 32],
                from: ValidatorStage::Activated
            }
        );
        // a finished validator still blocks a second predeposit
        assert!(lifecycle.ensure_new(&[1; 32]).is_err());
    }

    #[test]
    fn test_unknown_validator_is_transition_from_none() {
        let mut lifecycle = ValidatorLifecycle::new();
        let err = lifecycle
            .finish(&[7; 32], ValidatorStage::Activated, [0; 32])
            .unwrap_err();
        assert!(matches!(
            err,
            PdgError::InvalidStateTransition { from: ValidatorStage::None, .. }
        ));
    }

    #[test]
    fn test_release_bond_backing_only_touches_pending_records_of_operator() {
        let other = Address::from_label("otherOperator");
        let mut lifecycle = ValidatorLifecycle::new();
        lifecycle.predeposit([1; 32], vault(), operator()).unwrap();
        lifecycle.predeposit([2; 32], vault(), operator()).unwrap();
        lifecycle.predeposit([3; 32], vault(), other).unwrap();
        lifecycle
            .finish(&[2; 32], ValidatorStage::Activated, [0; 32])
            .unwrap();

        assert_eq!(lifecycle.release_bond_backing(&operator()), 1);
        assert!(!lifecycle.record(&[1; 32]).unwrap().bond_locked);
        assert!(lifecycle.record(&[3; 32]).unwrap().bond_locked);
        assert_eq!(lifecycle.release_bond_backing(&operator()), 0);

        // new predeposits after the change are backed again
        lifecycle.predeposit([4; 32], vault(), operator()).unwrap();
        assert!(lifecycle.record(&[4; 32]).unwrap().bond_locked);
    }

    #[test]
    fn test_record_json_uses_hex() {
        let mut lifecycle = ValidatorLifecycle::new();
        lifecycle.predeposit([0xab; 32], vault(), operator()).unwrap();
        let json = serde_json::to_value(lifecycle.record(&[0xab; 32]).unwrap()).unwrap();
        assert_eq!(json["stage"], "predeposited");
        assert_eq!(json["pubkey_hash"], format!("0x{}", "ab".repeat(32)));
        assert!(json.get("proof_hash").is_none());
    }
}
