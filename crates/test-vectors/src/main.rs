//! Test Vector Generator
//!
//! Generates JSON proof vectors for verifier implementations: the fixed
//! four-leaf scenarios plus deterministic larger trees with one valid and
//! one corrupted proof per validator.

use anyhow::{Context, Result};
use clap::Parser;
use cl_proof::hash::word_from_u128;
use cl_proof::sparse_proof::build_witness;
use cl_proof::{
    branch_serde, compute_leaf_hash, hash_pair, hex_bytes32, ClProofVerifier, Envelope, Hash32,
    ProofConfig, Slot, VerifierRequest,
};
use cl_proof::{Address, Contract};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "generate-test-vectors")]
#[command(about = "Generate validator proof vectors")]
struct Args {
    /// Output directory for test vectors
    #[arg(short, long, default_value = "test-vectors")]
    output: PathBuf,

    /// Number of generated trees besides the fixed scenarios
    #[arg(long, default_value = "3")]
    num_trees: usize,

    /// Validators in the first generated tree; each further tree doubles it
    #[arg(long, default_value = "10")]
    num_validators: usize,
}

/// Test vector file format
#[derive(Debug, Serialize)]
struct TestVectorFile {
    /// Two-to-one hash used for leaves and nodes
    hash: &'static str,
    vectors: Vec<ProofVector>,
}

/// One verification case
#[derive(Debug, Clone, Serialize)]
struct ProofVector {
    name: String,
    first_validator_gindex: u64,
    first_validator_depth: u32,
    slot: Slot,
    #[serde(with = "hex_bytes32")]
    state_root: Hash32,
    #[serde(with = "hex_bytes32")]
    pubkey_hash: Hash32,
    #[serde(with = "hex_bytes32")]
    withdrawal_credentials: Hash32,
    validator_index: u64,
    #[serde(with = "branch_serde")]
    branch: BTreeMap<u32, Hash32>,
    proof_length: u32,
    expected_valid: bool,
}

/// Validator `i` of generated tree `tree`
fn validator_words(tree: usize, i: usize) -> (Hash32, Hash32) {
    let tag = u128::try_from(tree).unwrap_or(u128::MAX) << 64;
    let i = u128::try_from(i).unwrap_or(u128::MAX);
    let pubkey_hash = hash_pair(&word_from_u128(tag | i), &word_from_u128(1));
    let withdrawal_credentials = hash_pair(&word_from_u128(tag | i), &word_from_u128(2));
    (pubkey_hash, withdrawal_credentials)
}

/// Scenarios on the four-leaf tree addressed from gindex 8 (depth 3)
fn fixed_scenarios() -> Result<Vec<ProofVector>> {
    let pair = |a, b| hash_pair(&word_from_u128(a), &word_from_u128(b));
    let leaves = vec![
        pair(0x1111, 0x2222),
        pair(0xABCD, 0x1234),
        pair(0x3333, 0x4444),
        pair(0x5555, 0x6666),
    ];
    let witness = build_witness(&leaves, 1)?;

    let valid = ProofVector {
        name: "four_leaf_index_1".to_string(),
        first_validator_gindex: 8,
        first_validator_depth: 3,
        slot: 200,
        state_root: witness.root,
        pubkey_hash: word_from_u128(0xABCD),
        withdrawal_credentials: word_from_u128(0x1234),
        validator_index: 1,
        branch: witness.branch.clone(),
        proof_length: witness.depth,
        expected_valid: true,
    };

    let mut tampered = valid.clone();
    tampered.name = "four_leaf_sibling_plus_one".to_string();
    tampered.slot = 300;
    if let Some(sibling) = tampered.branch.get_mut(&0) {
        increment(sibling);
    }
    tampered.expected_valid = false;

    let mut wrong_index = valid.clone();
    wrong_index.name = "four_leaf_wrong_index".to_string();
    wrong_index.slot = 500;
    wrong_index.validator_index = 0;
    wrong_index.expected_valid = false;

    let pubkey_hash = word_from_u128(0x42);
    let withdrawal_credentials = word_from_u128(0x43);
    let single_leaf = ProofVector {
        name: "single_leaf_root".to_string(),
        first_validator_gindex: 8,
        first_validator_depth: 3,
        slot: 600,
        state_root: compute_leaf_hash(&pubkey_hash, &withdrawal_credentials),
        pubkey_hash,
        withdrawal_credentials,
        validator_index: 0,
        branch: BTreeMap::new(),
        proof_length: 0,
        expected_valid: true,
    };

    Ok(vec![valid, tampered, wrong_index, single_leaf])
}

/// Add one to a big-endian word, wrapping
fn increment(word: &mut Hash32) {
    for byte in word.iter_mut().rev() {
        let (next, carry) = byte.overflowing_add(1);
        *byte = next;
        if !carry {
            break;
        }
    }
}

/// Valid and corrupted proofs for every validator of a deterministic tree
fn tree_vectors(tree: usize, num_validators: usize) -> Result<Vec<ProofVector>> {
    let validators: Vec<(Hash32, Hash32)> = (0..num_validators)
        .map(|i| validator_words(tree, i))
        .collect();
    let leaves: Vec<Hash32> = validators
        .iter()
        .map(|(pubkey_hash, wc)| compute_leaf_hash(pubkey_hash, wc))
        .collect();
    let slot = 1_000 * (tree as u64 + 1);

    let mut vectors = Vec::with_capacity(num_validators * 2);
    for (index, (pubkey_hash, withdrawal_credentials)) in validators.iter().enumerate() {
        let witness = build_witness(&leaves, index)?;
        let valid = ProofVector {
            name: format!("tree_{tree}_validator_{index}"),
            first_validator_gindex: 1 << witness.depth,
            first_validator_depth: witness.depth,
            slot,
            state_root: witness.root,
            pubkey_hash: *pubkey_hash,
            withdrawal_credentials: *withdrawal_credentials,
            validator_index: index as u64,
            branch: witness.branch,
            proof_length: witness.depth,
            expected_valid: true,
        };

        let mut corrupted = valid.clone();
        corrupted.name = format!("tree_{tree}_validator_{index}_corrupted");
        corrupted.withdrawal_credentials[0] ^= 0x01;
        corrupted.expected_valid = false;

        vectors.push(valid);
        vectors.push(corrupted);
    }
    Ok(vectors)
}

fn generate(num_trees: usize, num_validators: usize) -> Result<Vec<ProofVector>> {
    let mut vectors = fixed_scenarios()?;
    for tree in 0..num_trees {
        let size = num_validators.max(1) << tree;
        vectors.extend(tree_vectors(tree, size)?);
    }
    Ok(vectors)
}

/// Replay a vector against a fresh verifier
fn check(vector: &ProofVector) -> Result<bool> {
    let owner = Address::from_label("owner");
    let oracle = Address::from_label("oracle");
    let mut verifier = ClProofVerifier::new(
        owner,
        ProofConfig {
            oracle,
            first_validator_gindex: vector.first_validator_gindex,
            first_validator_depth: vector.first_validator_depth,
        },
    )?;
    verifier.handle(Envelope::new(
        oracle,
        1,
        VerifierRequest::SetStateRoot {
            slot: vector.slot,
            root: vector.state_root,
        },
    ))?;

    Ok(verifier.verify_proof(&cl_proof::ValidatorProof {
        pubkey_hash: vector.pubkey_hash,
        withdrawal_credentials: vector.withdrawal_credentials,
        validator_index: vector.validator_index,
        slot: vector.slot,
        branch: vector.branch.clone(),
        proof_length: vector.proof_length,
    }))
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    tracing::info!(
        output = %args.output.display(),
        trees = args.num_trees,
        validators = args.num_validators,
        "Generating test vectors"
    );

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("cannot create {}", args.output.display()))?;

    let vectors = generate(args.num_trees, args.num_validators)?;
    for vector in &vectors {
        let outcome = check(vector).with_context(|| format!("vector {}", vector.name))?;
        anyhow::ensure!(
            outcome == vector.expected_valid,
            "vector {} verifies as {outcome}, expected {}",
            vector.name,
            vector.expected_valid
        );
    }

    let file = TestVectorFile {
        hash: "sha256(left || right)",
        vectors,
    };
    let output_path = args.output.join("proof_vectors.json");
    let json = serde_json::to_string_pretty(&file)?;
    std::fs::write(&output_path, json)?;

    tracing::info!(path = %output_path.display(), count = file.vectors.len(), "Wrote test vectors");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_scenarios_match_expectations() {
        for vector in fixed_scenarios().unwrap() {
            assert_eq!(check(&vector).unwrap(), vector.expected_valid, "{}", vector.name);
        }
    }

    #[test]
    fn test_generated_trees_match_expectations() {
        let vectors = generate(2, 5).unwrap();
        // 4 fixed + (5 + 10) validators, two vectors each
        assert_eq!(vectors.len(), 4 + 2 * 15);
        for vector in &vectors {
            assert_eq!(check(vector).unwrap(), vector.expected_valid, "{}", vector.name);
        }
    }

    #[test]
    fn test_increment_carries() {
        let mut word = [0u8; 32];
        word[31] = 0xff;
        increment(&mut word);
        assert_eq!(word[31], 0);
        assert_eq!(word[30], 1);
    }

    #[test]
    fn test_vector_json_shape() {
        let vector = &fixed_scenarios().unwrap()[0];
        let json = serde_json::to_value(vector).unwrap();
        assert_eq!(json["validator_index"], 1);
        assert_eq!(json["proof_length"], 2);
        assert!(json["state_root"].as_str().unwrap().starts_with("0x"));
        assert!(json["branch"]["0"].is_string());
    }
}
