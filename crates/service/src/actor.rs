//! Serialized Actor Host
//!
//! Each entity runs in its own tokio task and drains an mpsc mailbox: client
//! requests, queries and delivery reports are applied strictly one at a
//! time, in arrival order.

use crate::dispatch::Dispatcher;
use crate::state::{AppState, RequestOutcome, RequestRecord};
use cl_proof::{Contract, Envelope, Outbound, Rejection};
use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::{self, WeakSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Mailbox depth per actor
pub const MAILBOX_CAPACITY: usize = 1024;

type HandleResult<C> =
    Result<Vec<Outbound<<C as Contract>::Notification>>, <C as Contract>::Error>;

/// Events consumed by an actor
pub enum Command<C: Contract> {
    Submit {
        envelope: Envelope<C::Request>,
        reply: oneshot::Sender<HandleResult<C>>,
    },
    Delivered(Outbound<C::Notification>),
    DeliveryFailed(Outbound<C::Notification>),
    Query(Box<dyn FnOnce(&C) + Send>),
}

/// The actor task is gone
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("{0} actor is not running")]
pub struct ActorClosed(pub &'static str);

/// Why a submitted request did not commit
#[derive(Debug, Error)]
pub enum SubmitError<E: std::error::Error + 'static> {
    #[error(transparent)]
    Rejected(E),

    #[error(transparent)]
    Closed(#[from] ActorClosed),
}

/// Cloneable address of a running actor
pub struct ActorHandle<C: Contract> {
    name: &'static str,
    tx: mpsc::Sender<Command<C>>,
}

impl<C: Contract> Clone for ActorHandle<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
        }
    }
}

impl<C: Contract> std::fmt::Debug for ActorHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorHandle").field("name", &self.name).finish()
    }
}

impl<C> ActorHandle<C>
where
    C: Contract + Send + 'static,
    C::Request: Send,
    C::Notification: Send,
    C::Error: Send,
{
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Submit a request and wait for the entity's verdict.
    ///
    /// # Errors
    /// [`SubmitError::Rejected`] carries the entity's refusal;
    /// [`SubmitError::Closed`] means the actor is gone.
    pub async fn submit(
        &self,
        envelope: Envelope<C::Request>,
    ) -> Result<Vec<Outbound<C::Notification>>, SubmitError<C::Error>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Submit { envelope, reply })
            .await
            .map_err(|_| ActorClosed(self.name))?;
        rx.await
            .map_err(|_| ActorClosed(self.name))?
            .map_err(SubmitError::Rejected)
    }

    /// Run a read-only closure against the entity between two requests.
    ///
    /// # Errors
    /// [`ActorClosed`] when the actor is gone.
    pub async fn query<R, F>(&self, f: F) -> Result<R, ActorClosed>
    where
        F: FnOnce(&C) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let query = Box::new(move |contract: &C| {
            let _ = tx.send(f(contract));
        });
        self.tx
            .send(Command::Query(query))
            .await
            .map_err(|_| ActorClosed(self.name))?;
        rx.await.map_err(|_| ActorClosed(self.name))
    }
}

struct Actor<C: Contract> {
    contract: C,
    mailbox: mpsc::Receiver<Command<C>>,
    feedback: WeakSender<Command<C>>,
    dispatcher: Dispatcher,
    state: AppState,
}

/// Start `contract` in its own task.
///
/// The task ends once every [`ActorHandle`] has been dropped.
pub fn spawn<C>(
    contract: C,
    dispatcher: Dispatcher,
    state: AppState,
) -> (ActorHandle<C>, JoinHandle<()>)
where
    C: Contract + Send + 'static,
    C::Request: Send,
    C::Notification: Serialize + Clone + Send,
    C::Error: Send,
{
    let name = contract.name();
    let (tx, mailbox) = mpsc::channel(MAILBOX_CAPACITY);
    let actor = Actor {
        contract,
        mailbox,
        feedback: tx.downgrade(),
        dispatcher,
        state,
    };
    let task = tokio::spawn(actor.run());
    (ActorHandle { name, tx }, task)
}

impl<C> Actor<C>
where
    C: Contract + Send + 'static,
    C::Request: Send,
    C::Notification: Serialize + Clone + Send,
    C::Error: Send,
{
    async fn run(mut self) {
        let entity = self.contract.name();
        info!(entity, "Actor started");

        while let Some(command) = self.mailbox.recv().await {
            match command {
                Command::Submit { envelope, reply } => {
                    let result = self.submit(envelope);
                    // the caller may have stopped waiting
                    let _ = reply.send(result);
                }
                Command::Delivered(outbound) => {
                    if let Err(e) = self.contract.on_delivered(&outbound) {
                        warn!(
                            entity,
                            delivery_id = outbound.delivery_id,
                            error = %e,
                            "Delivery report refused"
                        );
                    }
                }
                Command::DeliveryFailed(outbound) => {
                    match self.contract.on_delivery_failed(&outbound) {
                        Ok(()) => info!(
                            entity,
                            delivery_id = outbound.delivery_id,
                            "Delivery failure reconciled"
                        ),
                        Err(e) => warn!(
                            entity,
                            delivery_id = outbound.delivery_id,
                            error = %e,
                            "Delivery failure refused"
                        ),
                    }
                }
                Command::Query(query) => query(&self.contract),
            }
        }

        info!(entity, "Actor stopped");
    }

    fn submit(&mut self, envelope: Envelope<C::Request>) -> HandleResult<C> {
        let entity = self.contract.name();
        let sender = envelope.sender;
        let request_id = envelope.request_id;

        let result = self.contract.handle(envelope);
        let outcome = match &result {
            Ok(outbound) => {
                counter!("pdg_requests_total", "entity" => entity, "outcome" => "accepted")
                    .increment(1);
                info!(entity, request_id, %sender, outbound = outbound.len(), "Request accepted");
                self.dispatcher
                    .dispatch(entity, outbound.clone(), self.feedback.clone());
                RequestOutcome::Accepted {
                    outbound: outbound.len(),
                }
            }
            Err(err) => {
                counter!("pdg_requests_total", "entity" => entity, "outcome" => err.kind())
                    .increment(1);
                warn!(
                    entity,
                    request_id,
                    %sender,
                    kind = err.kind(),
                    error = %err,
                    "Request rejected"
                );
                RequestOutcome::Rejected {
                    kind: err.kind().to_string(),
                    error: err.to_string(),
                }
            }
        };

        self.state.record_request(RequestRecord {
            entity: entity.to_string(),
            request_id,
            sender,
            outcome,
        });
        result
    }
}
