//! # Predeposit Guarantee
//!
//! Escrow for node-operator bonds. A node operator (or its guarantor) bonds
//! collateral, predeposits validators against a staking vault, and the proof
//! authority later confirms each validator's withdrawal credentials:
//! - valid: the validator is activated and its bond lock is released
//! - invalid: the locked bond is forfeited to the staking vault
//!
//! The entity is a [`cl_proof::Contract`]; outbound payouts are committed
//! before delivery and reconciled if delivery fails.

pub mod error;
pub mod escrow;
pub mod ledger;
pub mod lifecycle;
pub mod messages;

pub use error::PdgError;
pub use escrow::{InFlightPayout, PredepositGuarantee, PREDEPOSIT_AMOUNT};
pub use ledger::{BondLedger, NodeOperatorBalance};
pub use lifecycle::{ValidatorLifecycle, ValidatorRecord, ValidatorStage};
pub use messages::{PayoutKind, PdgNotification, PdgRequest};
