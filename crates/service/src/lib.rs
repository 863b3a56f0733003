//! # Predeposit Guarantee Service
//!
//! Hosts the proof verifier and the escrow as serialized actors, delivers
//! their outbound messages, exposes both over REST and optionally feeds
//! finalized beacon state roots to the verifier.

pub mod actor;
pub mod api;
pub mod dispatch;
pub mod oracle;
pub mod state;

pub use actor::{ActorClosed, ActorHandle, SubmitError};
pub use api::ApiContext;
pub use dispatch::{DeliveryError, Dispatcher, LoggingTransport, Transport};
pub use oracle::{Oracle, OracleConfig};
pub use state::AppState;
