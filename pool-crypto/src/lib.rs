//! Hashing primitives and merge-mining merkle math for the WATTx pool.
//!
//! §1 lists the real proof-of-work primitives (SHA-256d, Scrypt, RandomX,
//! X11, the Equihash verifier, kHeavyHash, Keccak) as external collaborators
//! "assumed available and correct" — this crate is not where ASIC/GPU-grade
//! implementations of those belong. What *is* in scope here is what §4.A's
//! tag-injection and merkle fix-up steps need directly: SHA-256d and
//! Keccak-256 (real, via `sha2`/`sha3`, since the header/coinbase hashing for
//! the Bitcoin-family and Ethash-family adapters is ordinary double-hashing,
//! not a specialized PoW function), the Monero tree hash (the real pairwise
//! algorithm, built on Keccak-256), and the `PowBackend` boundary the
//! memory-hard/ASIC algorithms sit behind.

pub mod hash;
pub mod merkle;
pub mod pow;

pub use hash::{keccak256, monero_tree_hash, sha256d};
pub use merkle::apply_merkle_branch;
pub use pow::{PowBackend, PowError, StandardPowBackend};
