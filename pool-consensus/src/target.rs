//! Per-algorithm maximum target and difficulty<->target conversion (§4.A,
//! §9: "each chain's own max-target constant must be used").

use pool_core::{AlgorithmId, Hash256};

use crate::{u256_from_be_bytes, u256_from_f64, u256_to_be_bytes, u256_to_f64, U256};

/// The easiest (largest) target reachable by the Bitcoin-style compact-bits
/// encoding `0x1d00ffff`, shared by every Bitcoin-family algorithm and Ethash.
const BITCOIN_STYLE_MAX_BITS: u32 = 0x1d00ffff;

/// The "easiest target" for a chain family, as a big-endian 256-bit value.
///
/// Bitcoin-family algorithms (sha256d, scrypt, x11, equihash) and Ethash
/// share a Bitcoin-style compact-bits max target; RandomX/Monero has no
/// compact-bits encoding and instead defines its easiest target as
/// `2^256 - 1`.
pub fn max_target(algorithm: AlgorithmId) -> Hash256 {
    match algorithm {
        AlgorithmId::RandomX => [0xffu8; 32],
        _ => crate::compact::bits_to_target(BITCOIN_STYLE_MAX_BITS),
    }
}

/// `max_target / difficulty`, clamped to a non-zero target so a
/// pathologically high difficulty never collapses to an all-zero target
/// that no share could ever satisfy in a well-formed system.
pub fn difficulty_to_target(algorithm: AlgorithmId, difficulty: f64) -> Hash256 {
    if difficulty <= 0.0 {
        return max_target(algorithm);
    }
    let max = u256_to_f64(u256_from_be_bytes(&max_target(algorithm)));
    let target = u256_from_f64(max / difficulty);
    let target = if target.is_zero() { U256::one() } else { target };
    u256_to_be_bytes(target)
}

/// Inverse of [`difficulty_to_target`]: recovers the difficulty value whose
/// target is the closest achievable target `<=` the given one.
pub fn target_to_difficulty(algorithm: AlgorithmId, target: &Hash256) -> f64 {
    let max = u256_to_f64(u256_from_be_bytes(&max_target(algorithm)));
    let t = u256_to_f64(u256_from_be_bytes(target));
    if t == 0.0 {
        return f64::INFINITY;
    }
    max / t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn randomx_max_target_is_all_ones() {
        assert_eq!(max_target(AlgorithmId::RandomX), [0xffu8; 32]);
    }

    #[test]
    fn bitcoin_family_and_ethash_share_max_target() {
        assert_eq!(max_target(AlgorithmId::Sha256d), max_target(AlgorithmId::Ethash));
        assert_eq!(max_target(AlgorithmId::Sha256d), max_target(AlgorithmId::X11));
    }

    #[test]
    fn higher_difficulty_yields_smaller_target() {
        let easy = difficulty_to_target(AlgorithmId::Sha256d, 1.0);
        let hard = difficulty_to_target(AlgorithmId::Sha256d, 1000.0);
        let easy = u256_from_be_bytes(&easy);
        let hard = u256_from_be_bytes(&hard);
        assert!(hard < easy);
    }

    #[test]
    fn difficulty_round_trips_within_tolerance() {
        let original = 250.0;
        let target = difficulty_to_target(AlgorithmId::Sha256d, original);
        let recovered = target_to_difficulty(AlgorithmId::Sha256d, &target);
        assert!((recovered - original).abs() / original < 0.01);
    }

    #[test]
    fn difficulty_one_matches_max_target() {
        let target = u256_from_be_bytes(&difficulty_to_target(AlgorithmId::RandomX, 1.0));
        let max = u256_from_be_bytes(&max_target(AlgorithmId::RandomX));
        // The f64 round trip through u256_from_f64/u256_to_f64 only keeps the
        // top 64 significant bits, so compare via the same lossy projection
        // rather than requiring exact equality.
        assert!((u256_to_f64(target) - u256_to_f64(max)).abs() / u256_to_f64(max) < 1e-9);
    }
}
