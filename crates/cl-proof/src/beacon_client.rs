//! Beacon API HTTP Client
//!
//! Reads block headers and finality checkpoints from a beacon node so an
//! oracle can publish finalized state roots.

use crate::types::{parse_hex32, BeaconBlockHeader, FinalityCheckpoints, Hash32};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

/// Errors from beacon API operations
#[derive(Debug, Error)]
pub enum BeaconClientError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Header not found for block {0}")]
    HeaderNotFound(String),
}

/// Client for interacting with the Beacon API
#[derive(Debug, Clone)]
pub struct BeaconClient {
    client: Client,
    base_url: String,
}

impl BeaconClient {
    /// Create a new beacon client
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the beacon node (e.g., `http://localhost:5052`)
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Fetch beacon block header
    ///
    /// # Arguments
    /// * `block_id` - Block identifier (slot number, "head", "finalized", etc.)
    ///
    /// # Errors
    /// Returns error if the request fails or header is not found
    #[instrument(skip(self))]
    pub async fn get_header(&self, block_id: &str) -> Result<BeaconBlockHeader, BeaconClientError> {
        let url = format!("{}/eth/v1/beacon/headers/{block_id}", self.base_url);

        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BeaconClientError::HeaderNotFound(block_id.to_string()));
        }

        if !response.status().is_success() {
            return Err(BeaconClientError::InvalidResponse(format!(
                "Unexpected status: {}",
                response.status()
            )));
        }

        #[derive(Deserialize)]
        struct HeaderResponse {
            data: HeaderData,
        }

        #[derive(Deserialize)]
        struct HeaderData {
            header: HeaderMessage,
        }

        #[derive(Deserialize)]
        struct HeaderMessage {
            message: BeaconBlockHeaderJson,
        }

        #[derive(Deserialize)]
        struct BeaconBlockHeaderJson {
            slot: String,
            proposer_index: String,
            parent_root: String,
            state_root: String,
            body_root: String,
        }

        let header_resp: HeaderResponse = response.json().await?;
        let msg = header_resp.data.header.message;

        Ok(BeaconBlockHeader {
            slot: parse_u64(&msg.slot, "slot")?,
            proposer_index: parse_u64(&msg.proposer_index, "proposer_index")?,
            parent_root: parse_root(&msg.parent_root)?,
            state_root: parse_root(&msg.state_root)?,
            body_root: parse_root(&msg.body_root)?,
        })
    }

    /// Fetch finality checkpoints
    ///
    /// # Errors
    /// Returns error if the request fails
    #[instrument(skip(self))]
    pub async fn get_finality_checkpoints(&self) -> Result<FinalityCheckpoints, BeaconClientError> {
        let url = format!(
            "{}/eth/v1/beacon/states/head/finality_checkpoints",
            self.base_url
        );

        let response = self.client.get(&url).send().await?;

        #[derive(Deserialize)]
        struct CheckpointsResponse {
            data: CheckpointsData,
        }

        #[derive(Deserialize)]
        struct CheckpointsData {
            previous_justified: Checkpoint,
            current_justified: Checkpoint,
            finalized: Checkpoint,
        }

        #[derive(Deserialize)]
        struct Checkpoint {
            epoch: String,
            root: String,
        }

        let resp: CheckpointsResponse = response.json().await?;

        Ok(FinalityCheckpoints {
            previous_justified_epoch: parse_u64(&resp.data.previous_justified.epoch, "epoch")?,
            current_justified_epoch: parse_u64(&resp.data.current_justified.epoch, "epoch")?,
            finalized_epoch: parse_u64(&resp.data.finalized.epoch, "epoch")?,
            finalized_root: parse_root(&resp.data.finalized.root)?,
        })
    }

    /// Get current head slot
    ///
    /// # Errors
    /// Returns error if the request fails
    pub async fn get_head_slot(&self) -> Result<u64, BeaconClientError> {
        let header = self.get_header("head").await?;
        Ok(header.slot)
    }
}

fn parse_u64(s: &str, field: &str) -> Result<u64, BeaconClientError> {
    s.parse()
        .map_err(|e| BeaconClientError::InvalidResponse(format!("Invalid {field}: {e}")))
}

fn parse_root(s: &str) -> Result<Hash32, BeaconClientError> {
    parse_hex32(s).map_err(|e| BeaconClientError::InvalidResponse(e.to_string()))
}
