//! `ParentSnapshot` and `SecondaryTemplate` (§3).

use serde::{Deserialize, Serialize};

use crate::{CoreError, Hash256};

/// The coinbase-related fields of a parent block template (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinbaseData {
    /// Serialized coinbase transaction bytes.
    pub bytes: Vec<u8>,
    /// Merkle path from the coinbase to the transaction merkle root.
    pub merkle_branch: Vec<Hash256>,
    /// Coinbase index within the block — always 0.
    pub coinbase_index: u32,
    /// The transaction merkle root as computed from the unmodified template.
    pub merkle_root: Hash256,
    /// Byte offset of the reserve region inside `bytes`.
    pub reserve_offset: usize,
    /// Size in bytes of the reserve region.
    pub reserve_size: usize,
}

impl CoinbaseData {
    /// Validates the two invariants spec §3 places on the reserve region:
    /// it must fit inside the coinbase bytes, and substituting it must not
    /// change the coinbase's length (callers uphold the second half; this
    /// only checks the static bound that makes that possible).
    pub fn validate(&self) -> Result<(), CoreError> {
        if self
            .reserve_offset
            .checked_add(self.reserve_size)
            .map(|end| end > self.bytes.len())
            .unwrap_or(true)
        {
            return Err(CoreError::InvariantViolation(format!(
                "reserve region [{}, {}) exceeds coinbase length {}",
                self.reserve_offset,
                self.reserve_offset + self.reserve_size,
                self.bytes.len()
            )));
        }
        Ok(())
    }

    /// Returns a copy of the coinbase with the reserve region overwritten by
    /// `tag`, without changing the coinbase's length.
    pub fn with_reserve_overwritten(&self, tag: &[u8]) -> Result<Vec<u8>, CoreError> {
        self.validate()?;
        if tag.len() > self.reserve_size {
            return Err(CoreError::InvariantViolation(format!(
                "tag of {} bytes exceeds reserve size {}",
                tag.len(),
                self.reserve_size
            )));
        }
        let mut out = self.bytes.clone();
        out[self.reserve_offset..self.reserve_offset + tag.len()].copy_from_slice(tag);
        Ok(out)
    }
}

/// An immutable snapshot of one parent chain's block template (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentSnapshot {
    /// Bytes the miner hashes, after any tag injection already performed.
    pub hashing_blob: Vec<u8>,
    /// Opaque full template, retained only for later submission.
    pub full_template: Vec<u8>,
    /// Memory-hard PoWs (RandomX) use an epoch seed hash.
    pub seed_hash: Option<Hash256>,
    pub height: u64,
    pub difficulty: f64,
    pub target: Hash256,
    pub coinbase_data: CoinbaseData,
}

impl ParentSnapshot {
    pub fn validate(&self) -> Result<(), CoreError> {
        self.coinbase_data.validate()
    }
}

/// The secondary-chain (WATTx) block template a `Job` is built against (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondaryTemplate {
    pub header_bytes: Vec<u8>,
    pub coinbase_tx: Vec<u8>,
    pub target_bits: u32,
    pub height: u64,
    /// Opaque handle used to submit a solution for this exact template.
    pub handle: String,
    pub block_hash: Hash256,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_coinbase() -> CoinbaseData {
        CoinbaseData {
            bytes: vec![0u8; 64],
            merkle_branch: vec![],
            coinbase_index: 0,
            merkle_root: [0u8; 32],
            reserve_offset: 40,
            reserve_size: 16,
        }
    }

    #[test]
    fn reserve_overwrite_preserves_length() {
        let cb = sample_coinbase();
        let tag = vec![0xABu8; 16];
        let out = cb.with_reserve_overwritten(&tag).unwrap();
        assert_eq!(out.len(), cb.bytes.len());
        assert_eq!(&out[40..56], tag.as_slice());
    }

    #[test]
    fn validate_rejects_out_of_bounds_reserve() {
        let mut cb = sample_coinbase();
        cb.reserve_offset = 60;
        cb.reserve_size = 16;
        assert!(cb.validate().is_err());
    }

    #[test]
    fn overwrite_rejects_oversized_tag() {
        let cb = sample_coinbase();
        let tag = vec![0u8; 32];
        assert!(cb.with_reserve_overwritten(&tag).is_err());
    }
}
