//! Verifier errors

use crate::contract::Rejection;
use crate::replay::AlreadyProcessed;
use crate::types::{Address, RequestId, Slot};
use thiserror::Error;

/// Synchronous rejections of a verifier request. A rejected request leaves no trace.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifierError {
    #[error("{sender} is not the {role}")]
    Unauthorized { sender: Address, role: &'static str },

    #[error("request {0} already processed")]
    AlreadyProcessed(RequestId),

    #[error("no state root published for slot {0}")]
    UnknownSlot(Slot),

    #[error("proof for validator {validator_index} does not reach the root of slot {slot}")]
    ProofRejected { validator_index: u64, slot: Slot },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl VerifierError {
    /// Stable machine-readable name of the rejection
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "unauthorized",
            Self::AlreadyProcessed(_) => "already_processed",
            Self::UnknownSlot(_) => "unknown_slot",
            Self::ProofRejected { .. } => "proof_rejected",
            Self::InvalidArgument(_) => "invalid_argument",
        }
    }
}

impl Rejection for VerifierError {
    fn kind(&self) -> &'static str {
        Self::kind(self)
    }
}

impl From<AlreadyProcessed> for VerifierError {
    fn from(AlreadyProcessed(request_id): AlreadyProcessed) -> Self {
        Self::AlreadyProcessed(request_id)
    }
}
