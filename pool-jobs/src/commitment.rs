//! Merge-mining commitment construction (§4.C steps 5-6).

use pool_core::Hash256;
use pool_crypto::sha256d;

/// `aux_merkle_root = CommitOf(secondary_block_hash, secondary_chain_id)`: a
/// deterministic 32-byte commitment salted by the chain id, so two secondary
/// chains sharing the same parent never collide on the same tag.
pub fn commit_of(secondary_block_hash: &Hash256, secondary_chain_id: u32) -> Hash256 {
    let mut buf = Vec::with_capacity(36);
    buf.extend_from_slice(secondary_block_hash);
    buf.extend_from_slice(&secondary_chain_id.to_be_bytes());
    sha256d(&buf)
}

/// Merged-mining tag magic bytes, identifying the start of the tag inside a
/// coinbase scriptSig to parsers that look for it.
const MM_MAGIC: [u8; 4] = [0xfa, 0xbe, 0x6d, 0x6d];

/// Build `merge_mining_tag`: a length-prefixed framing carrying the magic,
/// `aux_merkle_root`, a merkle-size field (always 1 — this pool commits to
/// exactly one secondary chain), a 0 "index" field (§4.C step 6), and the
/// secondary chain id trailing so `ParentAdapter::create_aux_pow` can
/// recover it (see `pool_adapters::merge_tag_chain_id`).
pub fn build_merge_mining_tag(aux_merkle_root: &Hash256, secondary_chain_id: u32) -> Vec<u8> {
    let mut tag = Vec::with_capacity(4 + 32 + 4 + 4 + 4);
    tag.extend_from_slice(&MM_MAGIC);
    tag.extend_from_slice(aux_merkle_root);
    tag.extend_from_slice(&1u32.to_le_bytes());
    tag.extend_from_slice(&0u32.to_le_bytes());
    tag.extend_from_slice(&secondary_chain_id.to_be_bytes());
    tag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_of_is_deterministic_and_chain_salted() {
        let hash = [7u8; 32];
        let a = commit_of(&hash, 1);
        let b = commit_of(&hash, 1);
        let c = commit_of(&hash, 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn tag_carries_magic_root_and_chain_id() {
        let root = [9u8; 32];
        let tag = build_merge_mining_tag(&root, 0x1234);
        assert_eq!(&tag[0..4], &MM_MAGIC);
        assert_eq!(&tag[4..36], &root);
        assert_eq!(&tag[36..40], &1u32.to_le_bytes());
        assert_eq!(&tag[40..44], &0u32.to_le_bytes());
        assert_eq!(&tag[44..48], &0x1234u32.to_be_bytes());
    }
}
