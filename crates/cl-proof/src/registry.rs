//! State Root Registry
//!
//! Write-once store of beacon state roots keyed by slot.

use crate::error::VerifierError;
use crate::types::{Hash32, Slot};
use std::collections::HashMap;

/// Published beacon state roots
#[derive(Debug, Clone, Default)]
pub struct StateRootRegistry {
    roots: HashMap<Slot, Hash32>,
}

impl StateRootRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Root published for `slot`, if any
    #[must_use]
    pub fn get(&self, slot: Slot) -> Option<Hash32> {
        self.roots.get(&slot).copied()
    }

    #[must_use]
    pub fn contains(&self, slot: Slot) -> bool {
        self.roots.contains_key(&slot)
    }

    /// Record `root` for `slot`.
    ///
    /// # Errors
    /// Returns [`VerifierError::InvalidArgument`] if the slot already has a root.
    pub fn publish(&mut self, slot: Slot, root: Hash32) -> Result<(), VerifierError> {
        if self.roots.contains_key(&slot) {
            return Err(VerifierError::InvalidArgument(format!(
                "state root for slot {slot} is already set"
            )));
        }
        self.roots.insert(slot, root);
        Ok(())
    }

    /// Number of published roots
    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
