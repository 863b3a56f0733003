//! Replay protection
//!
//! Every mutating request carries a caller-chosen id. An id is consumed only
//! when its request commits; any later request reusing it is refused, whatever
//! its payload.

use crate::types::RequestId;
use std::collections::HashSet;
use thiserror::Error;

/// A request id was already consumed by this entity
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("request {0} already processed")]
pub struct AlreadyProcessed(pub RequestId);

/// Set of consumed request ids for one entity
#[derive(Debug, Clone, Default)]
pub struct ReplayGuard {
    processed: HashSet<RequestId>,
}

impl ReplayGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `request_id` has been consumed
    #[must_use]
    pub fn is_processed(&self, request_id: RequestId) -> bool {
        self.processed.contains(&request_id)
    }

    /// Refuse ids that were already consumed
    ///
    /// # Errors
    /// Returns [`AlreadyProcessed`] for a replayed id.
    pub fn ensure_fresh(&self, request_id: RequestId) -> Result<(), AlreadyProcessed> {
        if self.is_processed(request_id) {
            return Err(AlreadyProcessed(request_id));
        }
        Ok(())
    }

    /// Mark `request_id` consumed. Call only once the request has committed.
    pub fn consume(&mut self, request_id: RequestId) {
        self.processed.insert(request_id);
    }

    /// Number of consumed ids
    #[must_use]
    pub fn len(&self) -> usize {
        self.processed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }
}
