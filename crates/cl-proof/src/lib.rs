//! # Consensus-Layer Proof Library
//!
//! State-root bookkeeping and Merkle inclusion checks for validator
//! withdrawal credentials:
//! - per-slot beacon state roots published by a trusted oracle
//! - leaf hashing of `(pubkey_hash, withdrawal_credentials)`
//! - branch verification against a stored root using generalized indices
//!
//! Every stateful entity here is driven through the [`Contract`] trait, one
//! message at a time.

pub mod beacon_client;
pub mod contract;
pub mod error;
pub mod gindex;
pub mod hash;
pub mod registry;
pub mod replay;
pub mod sparse_proof;
pub mod types;
pub mod verifier;

pub use beacon_client::BeaconClient;
pub use contract::{Contract, Rejection};
pub use error::VerifierError;
pub use gindex::GindexCalculator;
pub use hash::{compute_leaf_hash, hash_pair};
pub use registry::StateRootRegistry;
pub use replay::{AlreadyProcessed, ReplayGuard};
pub use types::*;
pub use verifier::{
    verify_branch, ClProofVerifier, ProofConfig, ValidatorProof, VerifierNotification,
    VerifierRequest,
};
