//! Sparse Merkle Branch Generation
//!
//! Prover-side counterpart of the verifier: builds the sibling branch for a
//! leaf without allocating the full tree, padding missing leaves with zero
//! words and empty subtrees with precomputed zero hashes.
//!
//! Used by relayers, the test-vector generator and the test suites.

use crate::hash::hash_pair;
use crate::types::Hash32;
use std::collections::BTreeMap;
use thiserror::Error;

/// Maximum supported tree depth
const MAX_DEPTH: usize = 64;

/// Precomputed zero hashes for each depth level.
/// `ZERO_HASHES[0]` = all-zeros (the zero leaf).
/// `ZERO_HASHES[i]` = hash(ZERO_HASHES[i-1], ZERO_HASHES[i-1])
fn zero_hashes() -> Vec<Hash32> {
    let mut hashes = vec![[0u8; 32]; MAX_DEPTH + 1];
    for i in 1..=MAX_DEPTH {
        hashes[i] = hash_pair(&hashes[i - 1], &hashes[i - 1]);
    }
    hashes
}

/// The requested leaf has no place in the tree
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("leaf {index} out of range for depth {depth}")]
pub struct IndexOutOfRange {
    pub index: usize,
    pub depth: u32,
}

/// A branch for one leaf of a tree, in the shape the verifier consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleWitness {
    /// Tree root
    pub root: Hash32,
    /// Sibling hashes keyed by step, leaf level first
    pub branch: BTreeMap<u32, Hash32>,
    /// Number of steps (tree depth)
    pub depth: u32,
}

/// Generate a Merkle proof for `leaf_chunks[index]` in a tree of depth `depth`.
///
/// For leaves beyond `leaf_chunks.len()`, zero words are used.
///
/// Returns `(proof, root)` where `proof` is the list of sibling hashes
/// from leaf to root (length = depth).
///
/// # Errors
/// [`IndexOutOfRange`] if `index` does not fit in a tree of the given depth.
pub fn prove_against_leaf_chunks(
    leaf_chunks: &[Hash32],
    index: usize,
    depth: u32,
) -> Result<(Vec<Hash32>, Hash32), IndexOutOfRange> {
    if depth >= usize::BITS || index >= (1usize << depth) {
        return Err(IndexOutOfRange { index, depth });
    }
    let zh = zero_hashes();

    // At `level`, each node covers 2^level leaves; only the sibling subtree
    // of the target's ancestor is ever hashed.
    let mut proof = Vec::with_capacity(depth as usize);
    let mut pos = index;
    for level in 0..depth as usize {
        let sibling_pos = pos ^ 1;
        let start = sibling_pos << level;
        proof.push(compute_subtree_root(leaf_chunks, start, level, &zh));
        pos /= 2;
    }

    let mut current = get_leaf(leaf_chunks, index);
    for (level, sibling) in proof.iter().enumerate() {
        if (index >> level) & 1 == 0 {
            current = hash_pair(&current, sibling);
        } else {
            current = hash_pair(sibling, &current);
        }
    }

    Ok((proof, current))
}

/// Build the witness for `leaves[index]`, padding the tree to the next power of two
///
/// # Errors
/// [`IndexOutOfRange`] if `index` is not a leaf of `leaves`.
pub fn build_witness(leaves: &[Hash32], index: usize) -> Result<MerkleWitness, IndexOutOfRange> {
    let depth = leaves.len().next_power_of_two().trailing_zeros();
    if index >= leaves.len() {
        return Err(IndexOutOfRange { index, depth });
    }
    let (proof, root) = prove_against_leaf_chunks(leaves, index, depth)?;
    Ok(MerkleWitness {
        root,
        branch: branch_map(&proof),
        depth,
    })
}

/// Key a sibling list by step index
#[must_use]
pub fn branch_map(proof: &[Hash32]) -> BTreeMap<u32, Hash32> {
    (0u32..).zip(proof.iter().copied()).collect()
}

/// Get a leaf value, returning the zero word if out of bounds
fn get_leaf(leaf_chunks: &[Hash32], index: usize) -> Hash32 {
    leaf_chunks.get(index).copied().unwrap_or([0u8; 32])
}

/// Compute the root of a subtree starting at leaf index `start` with depth `depth`.
/// Uses zero hashes for missing leaves.
fn compute_subtree_root(
    leaf_chunks: &[Hash32],
    start: usize,
    depth: usize,
    zh: &[Hash32],
) -> Hash32 {
    if depth == 0 {
        return get_leaf(leaf_chunks, start);
    }

    if start >= leaf_chunks.len() {
        return zh[depth];
    }

    let half = 1usize << (depth - 1);
    let left = compute_subtree_root(leaf_chunks, start, depth - 1, zh);
    let right = compute_subtree_root(leaf_chunks, start + half, depth - 1, zh);
    hash_pair(&left, &right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssz_rs::prelude::Node;

    #[test]
    fn test_zero_hashes() {
        let zh = zero_hashes();
        assert_eq!(zh[0], [0u8; 32]);
        assert_eq!(zh[1], hash_pair(&[0u8; 32], &[0u8; 32]));
        assert_eq!(zh[2], hash_pair(&zh[1], &zh[1]));
    }

    #[test]
    fn test_prove_depth_0() {
        let leaves = vec![[42u8; 32]];
        let (proof, root) = prove_against_leaf_chunks(&leaves, 0, 0).unwrap();
        assert!(proof.is_empty());
        assert_eq!(root, [42u8; 32]);
    }

    #[test]
    fn test_prove_two_leaves() {
        let leaves = vec![[1u8; 32], [2u8; 32]];
        let (proof, root) = prove_against_leaf_chunks(&leaves, 0, 1).unwrap();
        assert_eq!(proof, vec![[2u8; 32]]);
        assert_eq!(root, hash_pair(&[1u8; 32], &[2u8; 32]));

        let (proof, root2) = prove_against_leaf_chunks(&leaves, 1, 1).unwrap();
        assert_eq!(proof, vec![[1u8; 32]]);
        assert_eq!(root2, root);
    }

    #[test]
    fn test_prove_with_virtual_padding() {
        // 3 actual leaves in a depth-2 tree (4 leaf slots)
        let leaves = vec![[1u8; 32], [2u8; 32], [3u8; 32]];
        let (proof, root) = prove_against_leaf_chunks(&leaves, 0, 2).unwrap();
        assert_eq!(proof[0], [2u8; 32]);
        assert_eq!(proof[1], hash_pair(&[3u8; 32], &[0u8; 32]));

        let left = hash_pair(&[1u8; 32], &proof[0]);
        assert_eq!(hash_pair(&left, &proof[1]), root);
    }

    #[test]
    fn test_prove_large_depth_sparse() {
        let leaves = vec![[0xAA; 32], [0xBB; 32]];
        let (proof, _root) = prove_against_leaf_chunks(&leaves, 0, 20).unwrap();
        assert_eq!(proof.len(), 20);

        let zh = zero_hashes();
        assert_eq!(proof[0], [0xBB; 32]);
        for (level, sibling) in proof.iter().enumerate().skip(1) {
            assert_eq!(*sibling, zh[level], "sibling at level {level} should be zero hash");
        }
    }

    #[test]
    fn test_build_witness_pads_to_power_of_two() {
        let leaves = vec![[1u8; 32], [2u8; 32], [3u8; 32], [4u8; 32], [5u8; 32]];
        let witness = build_witness(&leaves, 4).unwrap();
        assert_eq!(witness.depth, 3);
        assert_eq!(witness.branch.len(), 3);
        assert_eq!(witness.branch[&0], [0u8; 32]);
    }

    #[test]
    fn test_out_of_range_leaf_is_an_error() {
        let leaves = vec![[1u8; 32], [2u8; 32], [3u8; 32]];
        assert_eq!(
            build_witness(&leaves, 3),
            Err(IndexOutOfRange { index: 3, depth: 2 })
        );
        assert_eq!(
            prove_against_leaf_chunks(&leaves, 4, 2),
            Err(IndexOutOfRange { index: 4, depth: 2 })
        );
        assert!(prove_against_leaf_chunks(&leaves, 0, 64).is_err());
        assert!(build_witness(&[], 0).is_err());
    }

    #[test]
    fn test_branch_map_keys_by_step() {
        let map = branch_map(&[[1u8; 32], [2u8; 32]]);
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(map[&1], [2u8; 32]);
    }

    #[test]
    fn test_verify_proof_with_ssz_rs() {
        // Generate proof with our code, verify with ssz_rs
        let leaves = vec![[1u8; 32], [2u8; 32], [3u8; 32], [4u8; 32]];
        let (proof, root) = prove_against_leaf_chunks(&leaves, 2, 2).unwrap();

        let root_node = Node::try_from(root.as_slice()).unwrap();
        let leaf_node = Node::try_from(leaves[2].as_slice()).unwrap();
        let branch: Vec<Node> = proof
            .iter()
            .map(|b| Node::try_from(b.as_slice()).unwrap())
            .collect();

        // gindex for index 2 at depth 2 = 4 + 2 = 6
        ssz_rs::proofs::is_valid_merkle_branch_for_generalized_index(
            leaf_node, &branch, 6, root_node,
        )
        .expect("proof should be valid");
    }
}
