//! Escrow errors

use crate::lifecycle::ValidatorStage;
use cl_proof::{AlreadyProcessed, Address, Amount, DeliveryId, Hash32, Rejection, RequestId};
use thiserror::Error;

/// Synchronous rejections of an escrow request. A rejected request changes nothing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PdgError {
    #[error("{sender} is not the {role}")]
    Unauthorized { sender: Address, role: &'static str },

    #[error("request {0} already processed")]
    AlreadyProcessed(RequestId),

    #[error("insufficient unlocked balance: requested {requested}, available {available}")]
    InsufficientUnlocked { requested: Amount, available: Amount },

    #[error("validator 0x{} already predeposited", hex::encode(.0))]
    DuplicateValidator(Hash32),

    #[error("validator 0x{} cannot be proven from stage {from:?}", hex::encode(.pubkey_hash))]
    InvalidStateTransition {
        pubkey_hash: Hash32,
        from: ValidatorStage,
    },

    #[error("{0} is already the guarantor")]
    NoOpGuarantorChange(Address),

    #[error("{0} has no refund to claim")]
    NothingToClaim(Address),

    #[error("escrow is paused")]
    Paused,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("balance arithmetic overflow")]
    ArithmeticOverflow,

    #[error("no payout in flight for delivery {0}")]
    UnknownDelivery(DeliveryId),
}

impl PdgError {
    /// Stable machine-readable name of the rejection
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "unauthorized",
            Self::AlreadyProcessed(_) => "already_processed",
            Self::InsufficientUnlocked { .. } => "insufficient_unlocked",
            Self::DuplicateValidator(_) => "duplicate_validator",
            Self::InvalidStateTransition { .. } => "invalid_state_transition",
            Self::NoOpGuarantorChange(_) => "no_op_guarantor_change",
            Self::NothingToClaim(_) => "nothing_to_claim",
            Self::Paused => "paused",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::ArithmeticOverflow => "arithmetic_overflow",
            Self::UnknownDelivery(_) => "unknown_delivery",
        }
    }
}

impl Rejection for PdgError {
    fn kind(&self) -> &'static str {
        Self::kind(self)
    }
}

impl From<AlreadyProcessed> for PdgError {
    fn from(AlreadyProcessed(request_id): AlreadyProcessed) -> Self {
        Self::AlreadyProcessed(request_id)
    }
}
