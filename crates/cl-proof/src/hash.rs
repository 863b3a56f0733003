//! Pair hashing
//!
//! The single two-input primitive used for leaves and internal nodes alike:
//! `SHA-256(left || right)` over two 32-byte words.

use crate::types::Hash32;
use sha2::{Digest, Sha256};

/// SHA-256 hash of two 32-byte nodes
#[must_use]
pub fn hash_pair(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Leaf committed to for a validator: `hash_pair(pubkey_hash, withdrawal_credentials)`
#[must_use]
pub fn compute_leaf_hash(pubkey_hash: &Hash32, withdrawal_credentials: &Hash32) -> Hash32 {
    hash_pair(pubkey_hash, withdrawal_credentials)
}

/// Right-align a small integer in a 32-byte big-endian word
#[must_use]
pub fn word_from_u128(value: u128) -> Hash32 {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}
