//! Walking a stored merkle branch to recompute a root after the coinbase
//! changes (§4.A step 3): "for each sibling, combine `(current, sibling)` or
//! `(sibling, current)` per the coinbase's index bit at that level using the
//! chain's pairwise hash".

use pool_core::Hash256;

/// Recompute the merkle root given a leaf, its branch, its index, and the
/// chain-specific pairwise hash function (double-SHA-256 for Bitcoin-family,
/// Monero's Keccak-256 pairing for RandomX-family).
pub fn apply_merkle_branch(
    leaf: Hash256,
    branch: &[Hash256],
    index: u32,
    pairwise_hash: impl Fn(&Hash256, &Hash256) -> Hash256,
) -> Hash256 {
    let mut current = leaf;
    for (level, sibling) in branch.iter().enumerate() {
        let bit_set = (index >> level) & 1 == 1;
        current = if bit_set {
            pairwise_hash(sibling, &current)
        } else {
            pairwise_hash(&current, sibling)
        };
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256d;

    fn pairwise(a: &Hash256, b: &Hash256) -> Hash256 {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(a);
        buf[32..].copy_from_slice(b);
        sha256d(&buf)
    }

    #[test]
    fn empty_branch_returns_leaf_unchanged() {
        let leaf = [9u8; 32];
        assert_eq!(apply_merkle_branch(leaf, &[], 0, pairwise), leaf);
    }

    #[test]
    fn single_level_matches_manual_combine_left() {
        let leaf = [1u8; 32];
        let sibling = [2u8; 32];
        // index bit 0 = 0 -> leaf is on the left
        let got = apply_merkle_branch(leaf, &[sibling], 0, pairwise);
        assert_eq!(got, pairwise(&leaf, &sibling));
    }

    #[test]
    fn single_level_matches_manual_combine_right() {
        let leaf = [1u8; 32];
        let sibling = [2u8; 32];
        // index bit 0 = 1 -> leaf is on the right
        let got = apply_merkle_branch(leaf, &[sibling], 1, pairwise);
        assert_eq!(got, pairwise(&sibling, &leaf));
    }

    #[test]
    fn multi_level_walk_is_order_sensitive() {
        let leaf = [1u8; 32];
        let siblings = [[2u8; 32], [3u8; 32], [4u8; 32]];
        let a = apply_merkle_branch(leaf, &siblings, 0b011, pairwise);
        let b = apply_merkle_branch(leaf, &siblings, 0b101, pairwise);
        assert_ne!(a, b);
    }
}
