//! Real hash functions used directly by the merge-mining pipeline.

use pool_core::Hash256;
use sha2::{Digest, Sha256};
use sha3::Keccak256;

/// Double SHA-256, the Bitcoin-family pairwise/header hash.
pub fn sha256d(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    second.into()
}

/// Keccak-256, used for Ethash-family header hashing (§9 open question:
/// the real Keccak must be used, not a SHA-256 stand-in, or parent chains
/// will reject submissions).
pub fn keccak256(data: &[u8]) -> Hash256 {
    Keccak256::digest(data).into()
}

/// Monero's tree hash: repeatedly Keccak-256-hash adjacent pairs until one
/// root remains, duplicating the final element on odd counts exactly as
/// `cn_fast_hash`-based tree_hash does upstream. Used to recompute the
/// RandomX-family merkle root after tag injection (§4.A step 3/4).
pub fn monero_tree_hash(leaves: &[Hash256]) -> Hash256 {
    match leaves.len() {
        0 => [0u8; 32],
        1 => leaves[0],
        2 => keccak_pair(&leaves[0], &leaves[1]),
        _ => {
            let mut level: Vec<Hash256> = leaves.to_vec();
            // Monero reduces to the largest power of two <= len by hashing
            // from the front, then proceeds as a normal binary tree.
            let mut count = level.len();
            let mut pow2 = 1usize;
            while pow2 * 2 <= count {
                pow2 *= 2;
            }
            if count != pow2 {
                let extra = count - pow2;
                let mut reduced = Vec::with_capacity(pow2);
                for i in 0..extra {
                    reduced.push(keccak_pair(&level[2 * i], &level[2 * i + 1]));
                }
                reduced.extend_from_slice(&level[2 * extra..count]);
                level = reduced;
                count = pow2;
            }
            while count > 1 {
                count /= 2;
                for i in 0..count {
                    level[i] = keccak_pair(&level[2 * i], &level[2 * i + 1]);
                }
            }
            level[0]
        }
    }
}

fn keccak_pair(a: &Hash256, b: &Hash256) -> Hash256 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(a);
    buf[32..].copy_from_slice(b);
    keccak256(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256d_matches_double_digest() {
        let data = b"wattx";
        let expect = Sha256::digest(Sha256::digest(data));
        assert_eq!(sha256d(data).as_slice(), expect.as_slice());
    }

    #[test]
    fn tree_hash_single_leaf_is_identity() {
        let leaf = [7u8; 32];
        assert_eq!(monero_tree_hash(&[leaf]), leaf);
    }

    #[test]
    fn tree_hash_two_leaves_is_one_keccak_pair() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_eq!(monero_tree_hash(&[a, b]), keccak_pair(&a, &b));
    }

    #[test]
    fn tree_hash_is_deterministic_for_odd_counts() {
        let leaves: Vec<Hash256> = (0..5u8).map(|i| [i; 32]).collect();
        let a = monero_tree_hash(&leaves);
        let b = monero_tree_hash(&leaves);
        assert_eq!(a, b);
    }
}
