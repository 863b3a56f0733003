//! Shared Application State
//!
//! Thread-safe bookkeeping for submitted requests, delivery outcomes and
//! oracle progress. The entities themselves live inside their actors.

use cl_proof::{Address, RequestId, Slot};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Oracle lag beyond which the service reports itself degraded
pub const MAX_ORACLE_LAG_SLOTS: u64 = 128;

/// Final outcome of a submitted request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RequestOutcome {
    /// Committed; `outbound` messages were handed to the dispatcher
    Accepted { outbound: usize },
    /// Refused without any state change
    Rejected { kind: String, error: String },
}

/// Record for one request seen by an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestRecord {
    pub entity: String,
    pub request_id: RequestId,
    pub sender: Address,
    #[serde(flatten)]
    pub outcome: RequestOutcome,
}

/// Shared application state
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

#[derive(Debug)]
struct AppStateInner {
    /// Latest slot with a state root published by the oracle feeder
    published_slot: AtomicU64,
    /// Finalized epoch last seen by the oracle feeder
    finalized_epoch: AtomicU64,
    /// Head slot from beacon node
    head_slot: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    deliveries_failed: AtomicU64,
    /// Outcomes by entity and request id
    requests: DashMap<(String, RequestId), RequestRecord>,
    /// Service start time
    start_time: std::time::Instant,
    /// Last error message
    last_error: RwLock<Option<String>>,
}

impl AppState {
    /// Create new application state
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                published_slot: AtomicU64::new(0),
                finalized_epoch: AtomicU64::new(0),
                head_slot: AtomicU64::new(0),
                accepted: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
                deliveries_failed: AtomicU64::new(0),
                requests: DashMap::new(),
                start_time: std::time::Instant::now(),
                last_error: RwLock::new(None),
            }),
        }
    }

    #[must_use]
    pub fn published_slot(&self) -> Slot {
        self.inner.published_slot.load(Ordering::Relaxed)
    }

    /// Raise the published slot; never moves backwards
    pub fn set_published_slot(&self, slot: Slot) {
        self.inner.published_slot.fetch_max(slot, Ordering::Relaxed);
    }

    #[must_use]
    pub fn finalized_epoch(&self) -> u64 {
        self.inner.finalized_epoch.load(Ordering::Relaxed)
    }

    pub fn set_finalized_epoch(&self, epoch: u64) {
        self.inner.finalized_epoch.store(epoch, Ordering::Relaxed);
    }

    #[must_use]
    pub fn head_slot(&self) -> Slot {
        self.inner.head_slot.load(Ordering::Relaxed)
    }

    pub fn set_head_slot(&self, slot: Slot) {
        self.inner.head_slot.store(slot, Ordering::Relaxed);
    }

    /// Slots between the beacon head and the latest published root
    #[must_use]
    pub fn slots_behind(&self) -> u64 {
        self.head_slot().saturating_sub(self.published_slot())
    }

    /// Healthy while the oracle keeps up with the chain (or is not running)
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.slots_behind() <= MAX_ORACLE_LAG_SLOTS
    }

    /// Get uptime in seconds
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }

    /// Store the outcome of a request and bump the matching counter.
    ///
    /// An accepted outcome is never replaced by a later rejection of the
    /// same id (a replay).
    pub fn record_request(&self, record: RequestRecord) {
        let counter = match record.outcome {
            RequestOutcome::Accepted { .. } => &self.inner.accepted,
            RequestOutcome::Rejected { .. } => &self.inner.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let key = (record.entity.clone(), record.request_id);
        match self.inner.requests.entry(key) {
            Entry::Occupied(mut existing) => {
                if !matches!(existing.get().outcome, RequestOutcome::Accepted { .. }) {
                    existing.insert(record);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }
    }

    /// Latest outcome recorded for `request_id` at `entity`
    #[must_use]
    pub fn request(&self, entity: &str, request_id: RequestId) -> Option<RequestRecord> {
        self.inner
            .requests
            .get(&(entity.to_string(), request_id))
            .map(|r| r.clone())
    }

    pub fn record_delivery_failure(&self) {
        self.inner.deliveries_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn counts(&self) -> RequestCounts {
        RequestCounts {
            accepted: self.inner.accepted.load(Ordering::Relaxed),
            rejected: self.inner.rejected.load(Ordering::Relaxed),
            deliveries_failed: self.inner.deliveries_failed.load(Ordering::Relaxed),
        }
    }

    /// Set last error
    pub fn set_error(&self, error: Option<String>) {
        *self.inner.last_error.write() = error;
    }

    /// Get last error
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.read().clone()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Request and delivery counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RequestCounts {
    pub accepted: u64,
    pub rejected: u64,
    pub deliveries_failed: u64,
}
