//! Difficulty/target conversions per parent-chain family (§4.A).
//!
//! §9 design notes flag that `share_difficulty`'s `0x1d00ffff`-based
//! arithmetic is chain-specific and that each chain's own max-target
//! constant must be used — this crate takes that seriously: Bitcoin-family
//! algorithms (sha256d, scrypt, x11, equihash) and Ethash share a
//! Bitcoin-style "easiest compact bits" max target; RandomX/Monero uses
//! `2^256 - 1` (§4.A).
//!
//! All 256-bit values in this crate are big-endian byte arrays: the most
//! significant byte is `bytes[0]`. Adapters are responsible for converting
//! wire-format (often little-endian) values into this canonical
//! representation before calling in.

pub mod compact;
pub mod target;

pub use compact::{bits_to_target, get_bits_for_difficulty, get_difficulty_for_bits, target_to_bits};
pub use target::{difficulty_to_target, max_target, target_to_difficulty};

uint::construct_uint! {
    /// A 256-bit unsigned integer, used for target/difficulty arithmetic.
    pub struct U256(4);
}

/// Convert a big-endian 32-byte array to a `U256`.
pub fn u256_from_be_bytes(bytes: &[u8; 32]) -> U256 {
    U256::from_big_endian(bytes)
}

/// Convert a `U256` to a big-endian 32-byte array.
pub fn u256_to_be_bytes(value: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    value.to_big_endian(&mut out);
    out
}

/// Lossy `U256` -> `f64` conversion (no native widening float path exists for
/// a 256-bit integer). Keeps the top 64 significant bits and scales the rest
/// back in as a power of two, which is enough precision for difficulty
/// ratios and avoids the overflow panics `as_u128`/`as_u64` raise on values
/// near `2^256 - 1`.
pub fn u256_to_f64(value: U256) -> f64 {
    let bits = value.bits();
    if bits <= 64 {
        return value.low_u64() as f64;
    }
    let shift = bits - 64;
    let hi = (value >> shift).low_u64();
    (hi as f64) * 2f64.powi(shift as i32)
}

/// Inverse of [`u256_to_f64`], reconstructing an approximate `U256` from a
/// non-negative `f64`.
pub fn u256_from_f64(value: f64) -> U256 {
    if value <= 0.0 {
        return U256::zero();
    }
    // Clamp to 255: a 256-bit unsigned range only has bit indices 0..=255,
    // but `log2` on a value that rounds up to exactly `2^256` would
    // otherwise compute 256 and shift the mantissa out of range below.
    let bits = (value.log2().floor() as i32).clamp(0, 255);
    if bits <= 63 {
        return U256::from(value as u64);
    }
    let shift = bits - 63;
    let scaled = value / 2f64.powi(shift);
    U256::from(scaled as u64) << shift as usize
}
