//! Escrow request and notification payloads

use cl_proof::{hex_bytes32, Address, Amount, Hash32};
use serde::{Deserialize, Serialize};

/// Requests accepted by the escrow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdgRequest {
    /// Operator or guarantor
    TopUp { node_operator: Address, amount: Amount },
    /// Operator or guarantor; pays `amount` to `recipient`
    Withdraw {
        node_operator: Address,
        amount: Amount,
        recipient: Address,
    },
    /// Operator only
    SetGuarantor {
        node_operator: Address,
        new_guarantor: Address,
    },
    /// Operator only
    SetDepositor {
        node_operator: Address,
        new_depositor: Address,
    },
    /// Pays the caller's claimable refund to `recipient`
    ClaimGuarantorRefund { recipient: Address },
    /// Operator or depositor
    Predeposit {
        node_operator: Address,
        staking_vault: Address,
        #[serde(with = "hex_bytes32")]
        pubkey_hash: Hash32,
    },
    /// Proof authority only
    ProveWcAndActivate {
        #[serde(with = "hex_bytes32")]
        pubkey_hash: Hash32,
        #[serde(with = "hex_bytes32")]
        proof_hash: Hash32,
    },
    /// Proof authority only
    ProveInvalidValidatorWc {
        #[serde(with = "hex_bytes32")]
        pubkey_hash: Hash32,
        #[serde(with = "hex_bytes32")]
        proof_hash: Hash32,
    },
    /// Admin only
    Pause,
    /// Admin only
    Resume,
}

impl PdgRequest {
    /// Whether the request is refused while the escrow is paused
    #[must_use]
    pub const fn blocked_by_pause(&self) -> bool {
        !matches!(
            self,
            Self::SetDepositor { .. } | Self::Pause | Self::Resume
        )
    }
}

/// Why a payout was sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutKind {
    Withdrawal {
        node_operator: Address,
    },
    GuarantorRefund {
        guarantor: Address,
    },
    Compensation {
        staking_vault: Address,
        #[serde(with = "hex_bytes32")]
        pubkey_hash: Hash32,
    },
}

/// Messages the escrow sends out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdgNotification {
    /// Value transfer; reconciled if undeliverable
    Payout { amount: Amount, kind: PayoutKind },
    /// Informs the staking vault that its validator is active
    ValidatorActivated {
        #[serde(with = "hex_bytes32")]
        pubkey_hash: Hash32,
    },
}

impl PdgNotification {
    /// Amount carried, zero for plain notifications
    #[must_use]
    pub const fn amount(&self) -> Amount {
        match self {
            Self::Payout { amount, .. } => *amount,
            Self::ValidatorActivated { .. } => 0,
        }
    }
}
