//! Shared Types
//!
//! Identities, 32-byte words and the envelopes every entity exchanges.
//! Wire encoding is out of scope; these types only need serde so the
//! service can accept them as JSON.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A 256-bit hash or word (roots, leaves, pubkey hashes, credentials)
pub type Hash32 = [u8; 32];

/// Caller-assigned nonce carried by every mutating request
pub type RequestId = u64;

/// Beacon chain slot
pub type Slot = u64;

/// Coin amount in the host chain's smallest unit
pub type Amount = u128;

/// Identifier of an outbound message, echoed back on delivery reports
pub type DeliveryId = u64;

/// Error parsing a hex-encoded 32-byte value
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HexParseError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// Parse a `0x`-prefixed (or bare) hex string into 32 bytes
pub fn parse_hex32(s: &str) -> Result<Hash32, HexParseError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).map_err(|e| HexParseError::InvalidHex(e.to_string()))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| HexParseError::InvalidLength(len))
}

/// Authenticated identity of a message sender or recipient
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// Wrap raw account bytes
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Deterministic address derived from a human-readable label.
    ///
    /// Used for named fixtures and CLI defaults.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        Self(Sha256::digest(label.as_bytes()).into())
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = HexParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex32(s).map(Self)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An inbound request together with its authenticated sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<M> {
    /// Identity attached by the transport; never taken from the payload
    pub sender: Address,
    /// Replay-protection nonce
    pub request_id: RequestId,
    /// Typed request
    pub body: M,
}

impl<M> Envelope<M> {
    pub fn new(sender: Address, request_id: RequestId, body: M) -> Self {
        Self {
            sender,
            request_id,
            body,
        }
    }
}

/// A fire-and-forget message emitted by an entity after its state committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outbound<N> {
    /// Unique per emitting entity; the request id that produced it
    pub delivery_id: DeliveryId,
    /// Recipient
    pub to: Address,
    /// Payload
    pub body: N,
}

/// Beacon block header (JSON form, as served by the beacon API)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconBlockHeader {
    /// Slot number
    pub slot: u64,
    /// Proposer validator index
    pub proposer_index: u64,
    /// Root of the parent block
    #[serde(with = "hex_bytes32")]
    pub parent_root: Hash32,
    /// Root of the beacon state
    #[serde(with = "hex_bytes32")]
    pub state_root: Hash32,
    /// Root of the block body
    #[serde(with = "hex_bytes32")]
    pub body_root: Hash32,
}

/// Checkpoint for finality
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalityCheckpoints {
    /// Previous justified checkpoint epoch
    pub previous_justified_epoch: u64,
    /// Current justified checkpoint epoch
    pub current_justified_epoch: u64,
    /// Finalized checkpoint epoch
    pub finalized_epoch: u64,
    /// Finalized checkpoint root
    #[serde(with = "hex_bytes32")]
    pub finalized_root: Hash32,
}

/// Serde helpers for a single 32-byte word as `0x` hex
pub mod hex_bytes32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_hex32(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde helpers for a proof branch keyed by step index
pub mod branch_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S>(branch: &BTreeMap<u32, [u8; 32]>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded: BTreeMap<u32, String> = branch
            .iter()
            .map(|(step, h)| (*step, format!("0x{}", hex::encode(h))))
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<u32, [u8; 32]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: BTreeMap<u32, String> = BTreeMap::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(step, s)| {
                super::parse_hex32(&s)
                    .map(|h| (step, h))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}
