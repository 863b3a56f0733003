//! Message-handling contract shared by every entity
//!
//! Entities never call each other. They consume one [`Envelope`] at a time
//! and answer with outbound messages that the host delivers later. Delivery
//! outcomes come back as separate events through [`Contract::on_delivered`]
//! and [`Contract::on_delivery_failed`].

use crate::types::{Envelope, Outbound};

/// A synchronous refusal with a stable machine-readable name
pub trait Rejection: std::error::Error {
    /// Snake-case name used in metrics labels and API bodies
    fn kind(&self) -> &'static str;
}

/// A serialized, message-driven state machine
pub trait Contract {
    /// Inbound request payload
    type Request;
    /// Outbound message payload
    type Notification;
    /// Synchronous rejection
    type Error: Rejection;

    /// Entity name used in logs and metrics
    fn name(&self) -> &'static str;

    /// Apply one request atomically.
    ///
    /// On `Err` no state has changed. On `Ok` the state has committed and the
    /// returned messages must be delivered by the host.
    ///
    /// # Errors
    /// Returns the entity's rejection when a precondition does not hold.
    fn handle(
        &mut self,
        msg: Envelope<Self::Request>,
    ) -> Result<Vec<Outbound<Self::Notification>>, Self::Error>;

    /// Reconcile state after an outbound message could not be delivered.
    ///
    /// # Errors
    /// Returns an error when the delivery is unknown or already settled.
    fn on_delivery_failed(
        &mut self,
        failed: &Outbound<Self::Notification>,
    ) -> Result<(), Self::Error>;

    /// Settle bookkeeping after an outbound message was delivered.
    ///
    /// # Errors
    /// Returns an error when the delivery is unknown or already settled.
    fn on_delivered(
        &mut self,
        delivered: &Outbound<Self::Notification>,
    ) -> Result<(), Self::Error> {
        let _ = delivered;
        Ok(())
    }
}
