//! Generalized Index Computation
//!
//! Generalized indices (gindices) address nodes in a binary Merkle tree: the
//! root is 1 and the children of `g` are `2g` and `2g + 1`. The verifier
//! places validator `i` at `first_validator_gindex + i` and reads the sibling
//! order at every level from the parity of that position.

/// Calculator for generalized indices in the beacon state tree
#[derive(Debug, Clone, Copy)]
pub struct GindexCalculator;

impl GindexCalculator {
    // BeaconState has 37 fields in Electra, giving a tree depth of 6 (2^6 = 64 >= 37)
    const BEACON_STATE_BASE_GINDEX: u64 = 64; // 2^6

    // Field index of `validators` in BeaconState (0-indexed)
    const VALIDATORS_FIELD_INDEX: u64 = 11;

    // VALIDATOR_REGISTRY_LIMIT = 2^40
    const VALIDATOR_REGISTRY_DEPTH: u32 = 40;

    /// Gindex of `validators[0]` counted from the beacon state root.
    ///
    /// Path: state_root → validators → data_root → [0]
    #[must_use]
    pub fn first_validator_gindex() -> u64 {
        let validators_in_state = Self::BEACON_STATE_BASE_GINDEX + Self::VALIDATORS_FIELD_INDEX;
        let first_element_in_data = 1_u64 << Self::VALIDATOR_REGISTRY_DEPTH;

        Self::concat_gindices(&[
            validators_in_state,
            2, // data_root of list
            first_element_in_data,
        ])
    }

    /// Depth of [`Self::first_validator_gindex`], i.e. the expected proof length
    #[must_use]
    pub fn first_validator_depth() -> u32 {
        Self::gindex_depth(Self::first_validator_gindex())
    }

    /// Absolute position of validator `validator_index`.
    ///
    /// Returns `None` when the addition overflows.
    #[must_use]
    pub const fn validator_position(
        first_validator_gindex: u64,
        validator_index: u64,
    ) -> Option<u64> {
        first_validator_gindex.checked_add(validator_index)
    }

    /// Concatenate generalized indices along a path
    ///
    /// Given a sequence of gindices representing a path through nested structures,
    /// compute the final gindex from the outermost root.
    #[must_use]
    pub fn concat_gindices(gindices: &[u64]) -> u64 {
        let mut result = 1_u64; // Start at root

        for &gindex in gindices {
            let depth = Self::gindex_depth(gindex);
            result = (result << depth) | (gindex ^ (1_u64 << depth));
        }

        result
    }

    /// Depth (number of proof elements) of a non-zero gindex
    #[must_use]
    pub const fn gindex_depth(gindex: u64) -> u32 {
        63 - gindex.leading_zeros()
    }
}
