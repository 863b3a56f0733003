//! Outbound Dispatcher
//!
//! Delivers the messages an entity emitted after committing a request. The
//! outcome of every delivery is fed back into the emitting actor's mailbox
//! as a separate event, so reconciliation runs serialized with requests.

use crate::actor::Command;
use crate::state::AppState;
use cl_proof::{Address, Contract, DeliveryId, Outbound};
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::WeakSender;
use tracing::{debug, info, warn};

/// A message could not reach its recipient
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("delivery {delivery_id} to {to} failed: {reason}")]
pub struct DeliveryError {
    pub to: Address,
    pub delivery_id: DeliveryId,
    pub reason: String,
}

/// Carries outbound payloads to their recipients
pub trait Transport: Send + Sync {
    /// Deliver one JSON payload.
    ///
    /// # Errors
    /// Returns [`DeliveryError`] when the recipient did not accept it.
    fn deliver(
        &self,
        to: &Address,
        delivery_id: DeliveryId,
        payload: &serde_json::Value,
    ) -> Result<(), DeliveryError>;
}

/// Transport that accepts everything and writes it to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingTransport;

impl Transport for LoggingTransport {
    fn deliver(
        &self,
        to: &Address,
        delivery_id: DeliveryId,
        payload: &serde_json::Value,
    ) -> Result<(), DeliveryError> {
        info!(%to, delivery_id, %payload, "Outbound message");
        Ok(())
    }
}

/// Shared handle to a [`Transport`]
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    state: AppState,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, state: AppState) -> Self {
        Self { transport, state }
    }

    /// Deliver `outbound` in the background and report each outcome to `feedback`
    pub(crate) fn dispatch<C>(
        &self,
        entity: &'static str,
        outbound: Vec<Outbound<C::Notification>>,
        feedback: WeakSender<Command<C>>,
    ) where
        C: Contract + Send + 'static,
        C::Request: Send,
        C::Notification: Serialize + Send,
        C::Error: Send,
    {
        if outbound.is_empty() {
            return;
        }
        let transport = Arc::clone(&self.transport);
        let state = self.state.clone();

        tokio::spawn(async move {
            for message in outbound {
                let result = serde_json::to_value(&message.body)
                    .map_err(|e| DeliveryError {
                        to: message.to,
                        delivery_id: message.delivery_id,
                        reason: e.to_string(),
                    })
                    .and_then(|payload| {
                        transport.deliver(&message.to, message.delivery_id, &payload)
                    });

                let event = match result {
                    Ok(()) => {
                        debug!(entity, delivery_id = message.delivery_id, "Delivered");
                        Command::Delivered(message)
                    }
                    Err(e) => {
                        warn!(entity, error = %e, "Delivery failed");
                        counter!("pdg_deliveries_failed_total", "entity" => entity).increment(1);
                        state.record_delivery_failure();
                        Command::DeliveryFailed(message)
                    }
                };

                let Some(mailbox) = feedback.upgrade() else {
                    warn!(entity, "Actor stopped, delivery outcome dropped");
                    return;
                };
                if mailbox.send(event).await.is_err() {
                    warn!(entity, "Actor stopped, delivery outcome dropped");
                    return;
                }
            }
        });
    }
}
