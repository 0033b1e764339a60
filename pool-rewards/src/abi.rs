//! Minimal ABI encoding for the two calls the rewards side channel makes
//! (§6): `submitShares(address,uint256,bool,bool,uint256,uint256)` and
//! `finalizeBlock()`. Just enough of the Solidity ABI to build calldata for
//! these two fixed signatures — not a general encoder.

use sha3::{Digest, Keccak256};

fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn encode_uint256(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

fn encode_bool(value: bool) -> [u8; 32] {
    encode_uint256(value as u64)
}

/// Encodes a secondary-chain address as an ABI `address` word. Addresses on
/// non-EVM secondary chains won't parse as hex; those are folded into a
/// deterministic pseudo-address via Keccak-256 rather than rejected, since
/// the rewards contract only needs a stable per-miner key, not a real
/// withdrawable EVM address.
fn encode_address(secondary_address: &str) -> [u8; 32] {
    let trimmed = secondary_address.trim_start_matches("0x");
    let bytes20 = hex::decode(trimmed)
        .ok()
        .filter(|b| b.len() == 20)
        .unwrap_or_else(|| Keccak256::digest(secondary_address.as_bytes())[12..].to_vec());
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&bytes20);
    word
}

/// `submitShares(address secondaryAddress, uint256 shares, bool parentValid,
/// bool secondaryValid, uint256 parentHeight, uint256 secondaryHeight)`.
pub fn encode_submit_shares(
    secondary_address: &str,
    shares: u64,
    parent_valid: bool,
    secondary_valid: bool,
    parent_height: u64,
    secondary_height: u64,
) -> Vec<u8> {
    let mut data = selector("submitShares(address,uint256,bool,bool,uint256,uint256)").to_vec();
    data.extend_from_slice(&encode_address(secondary_address));
    data.extend_from_slice(&encode_uint256(shares));
    data.extend_from_slice(&encode_bool(parent_valid));
    data.extend_from_slice(&encode_bool(secondary_valid));
    data.extend_from_slice(&encode_uint256(parent_height));
    data.extend_from_slice(&encode_uint256(secondary_height));
    data
}

/// `finalizeBlock()` — no arguments, calldata is just the selector.
pub fn encode_finalize_block() -> Vec<u8> {
    selector("finalizeBlock()").to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_is_four_bytes_and_stable() {
        let a = selector("submitShares(address,uint256,bool,bool,uint256,uint256)");
        let b = selector("submitShares(address,uint256,bool,bool,uint256,uint256)");
        assert_eq!(a, b);
        assert_eq!(a.len(), 4);
    }

    #[test]
    fn submit_shares_calldata_is_selector_plus_six_words() {
        let data = encode_submit_shares("0x00000000000000000000000000000000000000aa", 5, true, false, 10, 20);
        assert_eq!(data.len(), 4 + 6 * 32);
        assert_eq!(data[4 + 31], 0xaa);
        assert!(data[4 + 12..4 + 31].iter().all(|b| *b == 0));
    }

    #[test]
    fn non_hex_address_falls_back_to_hashed_pseudo_address() {
        let a = encode_submit_shares("wtx1minerfoo", 1, true, true, 1, 1);
        let b = encode_submit_shares("wtx1minerbar", 1, true, true, 1, 1);
        assert_ne!(&a[4..4 + 32], &b[4..4 + 32]);
    }

    #[test]
    fn finalize_block_calldata_is_selector_only() {
        assert_eq!(encode_finalize_block().len(), 4);
    }
}
