//! `HashrateWindow` and `MinerScore` (§3) — the data the Scoring Engine
//! (§4.G) reads and rewrites. The computation itself lives in `pool-scoring`;
//! this crate only owns the shapes, plus the "identity element" constructor
//! invariant §3 calls out.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Per-chain hashrate estimate, rebuilt every scoring tick (§4.G pass 1/2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HashrateWindow {
    pub network_hashrate: f64,
    pub pool_hashrate: f64,
    pub pool_share_count: u64,
    pub miner_hashrates: HashMap<String, f64>,
    pub last_update: u64,
}

/// A single miner's cross-chain score (§3 `MinerScore`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerScore {
    pub chain_contributions_raw: HashMap<String, f64>,
    pub chain_contributions: HashMap<String, f64>,
    pub total_score: f64,
    pub reward_share: f64,
    pub chains_mined: usize,
    pub concentration_index: f64,
    pub luck_multiplier: f64,
}

impl MinerScore {
    /// The identity element: no contributions anywhere, neutral luck.
    /// Per §3's invariant, this is what a miner with `total_score == 0`
    /// must collapse to — never `NaN`/`Inf` from a `0/0` division.
    pub fn identity() -> Self {
        MinerScore {
            chain_contributions_raw: HashMap::new(),
            chain_contributions: HashMap::new(),
            total_score: 0.0,
            reward_share: 0.0,
            chains_mined: 0,
            concentration_index: 0.0,
            luck_multiplier: 1.0,
        }
    }

    /// All tracked fractions are finite (§3 invariant).
    pub fn is_well_formed(&self) -> bool {
        self.total_score.is_finite()
            && self.reward_share.is_finite()
            && self.concentration_index.is_finite()
            && self.luck_multiplier.is_finite()
            && self.chain_contributions.values().all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_well_formed() {
        let id = MinerScore::identity();
        assert!(id.is_well_formed());
        assert_eq!(id.luck_multiplier, 1.0);
        assert_eq!(id.total_score, 0.0);
    }
}
