//! State-Root Oracle Feeder
//!
//! Follows beacon-chain finality and publishes the state root of each newly
//! finalized epoch-boundary block to the verifier, acting as the oracle.

use crate::actor::{ActorHandle, SubmitError};
use crate::state::AppState;
use anyhow::{Context, Result};
use cl_proof::beacon_client::BeaconClientError;
use cl_proof::{
    Address, BeaconBlockHeader, BeaconClient, ClProofVerifier, Envelope, RequestId, Slot,
    VerifierRequest,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, instrument};

/// High bit set on every request id the feeder submits
pub const ORACLE_REQUEST_TAG: RequestId = 1 << 63;

/// Request id used to publish the root of `slot`
#[must_use]
pub const fn request_id_for_slot(slot: Slot) -> RequestId {
    ORACLE_REQUEST_TAG | slot
}

/// Oracle configuration
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Beacon node URL
    pub beacon_url: String,
    /// Polling interval
    pub poll_interval: Duration,
    /// Slots per epoch (mainnet = 32)
    pub slots_per_epoch: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            beacon_url: "http://localhost:5052".to_string(),
            poll_interval: Duration::from_secs(12),
            slots_per_epoch: 32,
        }
    }
}

/// Beacon-finality follower that feeds the verifier
pub struct Oracle {
    config: OracleConfig,
    client: BeaconClient,
    identity: Address,
    verifier: ActorHandle<ClProofVerifier>,
    state: AppState,
    last_finalized_epoch: AtomicU64,
}

impl Oracle {
    /// Create a feeder submitting as `identity`
    #[must_use]
    pub fn new(
        config: OracleConfig,
        identity: Address,
        verifier: ActorHandle<ClProofVerifier>,
        state: AppState,
    ) -> Self {
        let client = BeaconClient::new(&config.beacon_url);
        Self {
            config,
            client,
            identity,
            verifier,
            state,
            last_finalized_epoch: AtomicU64::new(0),
        }
    }

    /// Run the oracle loop
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<()> {
        info!(oracle = %self.identity, "Starting state-root oracle");

        loop {
            match self.poll_once().await {
                Ok(_) => self.state.set_error(None),
                Err(e) => {
                    error!(error = %e, "Oracle poll failed");
                    self.state.set_error(Some(format!("{e:#}")));
                }
            }

            sleep(self.config.poll_interval).await;
        }
    }

    /// Single poll iteration. Returns the slot whose root was published, if any.
    ///
    /// # Errors
    /// Beacon API failures and verifier rejections.
    pub async fn poll_once(&self) -> Result<Option<Slot>> {
        let head_slot = self.client.get_head_slot().await?;
        self.state.set_head_slot(head_slot);

        let checkpoints = self.client.get_finality_checkpoints().await?;
        let finalized_epoch = checkpoints.finalized_epoch;
        self.state.set_finalized_epoch(finalized_epoch);

        // Only process each finalized epoch once
        let last = self.last_finalized_epoch.load(Ordering::Relaxed);
        if finalized_epoch <= last {
            return Ok(None);
        }

        let header = self.finalized_header(finalized_epoch).await?;
        let slot = header.slot;

        let known = self
            .verifier
            .query(move |v| v.state_root(slot))
            .await?;
        let published = if known.is_some() {
            info!(slot, "State root already published");
            None
        } else {
            self.publish(&header).await?;
            Some(slot)
        };

        self.state.set_published_slot(slot);
        self.last_finalized_epoch
            .store(finalized_epoch, Ordering::Relaxed);
        Ok(published)
    }

    /// Header of the first slot of `epoch`, or the latest finalized block
    /// when that slot is empty
    async fn finalized_header(&self, epoch: u64) -> Result<BeaconBlockHeader> {
        let boundary = epoch
            .checked_mul(self.config.slots_per_epoch)
            .context("finalized slot overflows")?;

        match self.client.get_header(&boundary.to_string()).await {
            Ok(header) => Ok(header),
            Err(BeaconClientError::HeaderNotFound(_)) => {
                info!(slot = boundary, "Epoch boundary slot empty, using finalized head");
                Ok(self.client.get_header("finalized").await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn publish(&self, header: &BeaconBlockHeader) -> Result<()> {
        let request = VerifierRequest::SetStateRoot {
            slot: header.slot,
            root: header.state_root,
        };
        let envelope = Envelope::new(self.identity, request_id_for_slot(header.slot), request);

        match self.verifier.submit(envelope).await {
            Ok(_) => {
                info!(
                    slot = header.slot,
                    root = %hex::encode(header.state_root),
                    "Published finalized state root"
                );
                Ok(())
            }
            Err(SubmitError::Rejected(e)) => {
                Err(e).with_context(|| format!("verifier refused root for slot {}", header.slot))
            }
            Err(SubmitError::Closed(e)) => Err(e.into()),
        }
    }
}
