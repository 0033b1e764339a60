//! The closed enumeration of mining algorithms (§3 `AlgorithmId`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the seven supported proof-of-work algorithms.
///
/// Each variant has a canonical name string and a stable numeric id used
/// in the AuxPoW chain-id field (§4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmId {
    Sha256d,
    Scrypt,
    RandomX,
    Ethash,
    Equihash,
    X11,
    KHeavyHash,
}

impl AlgorithmId {
    pub const ALL: [AlgorithmId; 7] = [
        AlgorithmId::Sha256d,
        AlgorithmId::Scrypt,
        AlgorithmId::RandomX,
        AlgorithmId::Ethash,
        AlgorithmId::Equihash,
        AlgorithmId::X11,
        AlgorithmId::KHeavyHash,
    ];

    /// Canonical lowercase name, used in config files and log lines.
    pub const fn canonical_name(self) -> &'static str {
        match self {
            AlgorithmId::Sha256d => "sha256d",
            AlgorithmId::Scrypt => "scrypt",
            AlgorithmId::RandomX => "randomx",
            AlgorithmId::Ethash => "ethash",
            AlgorithmId::Equihash => "equihash",
            AlgorithmId::X11 => "x11",
            AlgorithmId::KHeavyHash => "kheavyhash",
        }
    }

    /// Stable numeric id, embedded in AuxPoW chain-id fields.
    pub const fn numeric_id(self) -> u32 {
        match self {
            AlgorithmId::Sha256d => 0,
            AlgorithmId::Scrypt => 1,
            AlgorithmId::RandomX => 2,
            AlgorithmId::Ethash => 3,
            AlgorithmId::Equihash => 4,
            AlgorithmId::X11 => 5,
            AlgorithmId::KHeavyHash => 6,
        }
    }

    pub fn from_canonical_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.canonical_name() == name)
    }

    /// Index within a caller-supplied, startup-configured ordering — used to
    /// derive this algorithm's listen port (`base_port + index`, §6).
    pub fn index_in(self, configured_order: &[AlgorithmId]) -> Option<usize> {
        configured_order.iter().position(|a| *a == self)
    }
}

impl fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_round_trips_through_name() {
        for algo in AlgorithmId::ALL {
            let name = algo.canonical_name();
            assert_eq!(AlgorithmId::from_canonical_name(name), Some(algo));
        }
    }

    #[test]
    fn numeric_ids_are_distinct() {
        let mut ids: Vec<u32> = AlgorithmId::ALL.iter().map(|a| a.numeric_id()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), AlgorithmId::ALL.len());
    }

    #[test]
    fn index_in_reflects_configured_order() {
        let order = [AlgorithmId::Ethash, AlgorithmId::Sha256d, AlgorithmId::RandomX];
        assert_eq!(AlgorithmId::Sha256d.index_in(&order), Some(1));
        assert_eq!(AlgorithmId::X11.index_in(&order), None);
    }
}
