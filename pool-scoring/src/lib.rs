//! Scoring Engine (§4.G): sliding-window hashrate estimation, the 50%
//! per-chain cap, and the Herfindahl-based luck multiplier.
//!
//! Scoring tables live behind their own mutex, separate from the session
//! table (§5: "Scoring tables use a separate mutex so reader paths ... do
//! not contend with scoring rebuilds") — callers (`pool-server`) wrap a
//! `ScoringEngine` in its own `Mutex`/`RwLock` rather than this crate doing
//! so internally, keeping the engine itself a plain, testable value type.

use std::collections::HashMap;

use pool_core::{Hash256, HashrateWindow, MinerScore};

/// `Σ(difficulty * 2^32) / 600` — the 600s block-time approximation used
/// identically for network and pool hashrate (§4.G pass 1) so the factor
/// cancels when comparing a miner's share of either.
const HASHRATE_FACTOR: f64 = 4_294_967_296.0 / 600.0;

#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub max_nethash_percent_per_chain: f64,
    pub min_luck_multiplier: f64,
    pub max_luck_multiplier: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            max_nethash_percent_per_chain: 50.0,
            min_luck_multiplier: 0.5,
            max_luck_multiplier: 3.0,
        }
    }
}

/// The Scoring Engine's state: one `HashrateWindow` per chain, the raw
/// recorded-share counts `RecordMinerShare` feeds (§4.F step 8), and the
/// derived `MinerScore` per secondary address.
#[derive(Default)]
pub struct ScoringEngine {
    config: ScoringConfig,
    windows: HashMap<String, HashrateWindow>,
    /// (chain, miner secondary address) -> shares recorded via
    /// `record_miner_share`. Capped miners are never recorded here (§4.F
    /// step 7/8), so a miner already at the cap cannot inflate the
    /// estimate that's multiplied back into the score.
    recorded_shares: HashMap<(String, String), u64>,
    scores: HashMap<String, MinerScore>,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        ScoringEngine {
            config,
            windows: HashMap::new(),
            recorded_shares: HashMap::new(),
            scores: HashMap::new(),
        }
    }

    /// §4.F steps 7/8: a share from a capped miner still counts as a valid
    /// parent share, but is silently dropped here so `miner_hashrate` on
    /// that chain cannot climb further past the cap.
    pub fn record_miner_share(&mut self, miner: &str, chain: &str) {
        *self
            .recorded_shares
            .entry((chain.to_string(), miner.to_string()))
            .or_insert(0) += 1;
    }

    /// Pass 1 (§4.G): network and pool hashrate for one chain, from its
    /// current daemon-reported difficulty and the pool's total accepted
    /// share count on that chain.
    pub fn update_chain_stats(
        &mut self,
        chain: &str,
        difficulty: f64,
        pool_accepted_shares_total: u64,
        share_difficulty: f64,
        now: u64,
    ) {
        let window = self.windows.entry(chain.to_string()).or_default();
        window.network_hashrate = difficulty * HASHRATE_FACTOR;
        window.pool_hashrate = pool_accepted_shares_total as f64 * share_difficulty * HASHRATE_FACTOR;
        window.pool_share_count = pool_accepted_shares_total;
        window.last_update = now;
    }

    /// Pass 2 (§4.G): reset every chain's `miner_hashrates` map, then
    /// rebuild it from the recorded-share counts.
    pub fn rebuild_miner_hashrates(&mut self, share_difficulty: f64) {
        for window in self.windows.values_mut() {
            window.miner_hashrates.clear();
        }
        for ((chain, miner), count) in &self.recorded_shares {
            let Some(window) = self.windows.get_mut(chain) else {
                continue;
            };
            *window.miner_hashrates.entry(miner.clone()).or_insert(0.0) +=
                *count as f64 * share_difficulty * HASHRATE_FACTOR;
        }
    }

    /// Pass 3 (§4.G): recompute every miner's cross-chain score.
    pub fn recompute_scores(&mut self) {
        let mut miners: Vec<String> = self
            .windows
            .values()
            .flat_map(|w| w.miner_hashrates.keys().cloned())
            .collect();
        miners.sort();
        miners.dedup();

        let mut totals: HashMap<String, MinerScore> = HashMap::new();
        for miner in &miners {
            totals.insert(miner.clone(), self.score_one(miner));
        }

        let grand_total: f64 = totals.values().map(|s| s.total_score).sum();
        if grand_total > 0.0 {
            for score in totals.values_mut() {
                score.reward_share = score.total_score / grand_total;
            }
        }

        self.scores = totals;
    }

    fn score_one(&self, miner: &str) -> MinerScore {
        let mut raw = HashMap::new();
        let mut capped = HashMap::new();

        for (chain, window) in &self.windows {
            if window.network_hashrate <= 0.0 {
                continue;
            }
            let Some(hr) = window.miner_hashrates.get(miner) else {
                continue;
            };
            let r = hr / window.network_hashrate * 100.0;
            if r <= 0.0 {
                continue;
            }
            raw.insert(chain.clone(), r);
            capped.insert(chain.clone(), r.min(self.config.max_nethash_percent_per_chain));
        }

        let total_score: f64 = capped.values().sum();
        if total_score <= 0.0 {
            return MinerScore::identity();
        }

        let concentration: f64 = capped
            .values()
            .map(|c| {
                let share = c / total_score;
                share * share
            })
            .sum();
        let raw_luck = if concentration > 0.0 {
            1.0 / concentration.sqrt()
        } else {
            1.0
        };
        let luck = (self.config.min_luck_multiplier
            + (raw_luck - 1.0) * (self.config.max_luck_multiplier - self.config.min_luck_multiplier) / 2.0)
            .clamp(self.config.min_luck_multiplier, self.config.max_luck_multiplier);

        MinerScore {
            chains_mined: capped.len(),
            chain_contributions_raw: raw,
            chain_contributions: capped,
            total_score,
            reward_share: 0.0,
            concentration_index: concentration,
            luck_multiplier: luck,
        }
    }

    /// `IsMinerCappedOnChain` (§4.G): true iff the miner's *uncapped*
    /// contribution on `chain` is already at or past the cap.
    pub fn is_miner_capped_on_chain(&self, miner: &str, chain: &str) -> bool {
        let Some(window) = self.windows.get(chain) else {
            return false;
        };
        if window.network_hashrate <= 0.0 {
            return false;
        }
        let hr = window.miner_hashrates.get(miner).copied().unwrap_or(0.0);
        (hr / window.network_hashrate * 100.0) >= self.config.max_nethash_percent_per_chain
    }

    /// `GetAdjustedSecondaryTarget` (§4.G): multiply `base` by the miner's
    /// luck using 1e6-scale fixed-point arithmetic, capped at `max_target`.
    pub fn adjusted_secondary_target(&self, base: Hash256, miner: &str, max_target: Hash256) -> Hash256 {
        let luck = self.scores.get(miner).map(|s| s.luck_multiplier).unwrap_or(1.0);
        const SCALE: i64 = 1_000_000;
        let luck_fixed = (luck * SCALE as f64).round() as i64;
        if luck_fixed == SCALE {
            // No adjustment: skip the lossy f64 round-trip entirely.
            return base;
        }

        let base = pool_consensus::u256_from_be_bytes(&base);
        let scaled_f64 = pool_consensus::u256_to_f64(base) * (luck_fixed as f64 / SCALE as f64);
        let scaled = pool_consensus::u256_from_f64(scaled_f64);
        let max = pool_consensus::u256_from_be_bytes(&max_target);
        let clamped = scaled.min(max);
        pool_consensus::u256_to_be_bytes(clamped)
    }

    pub fn score(&self, miner: &str) -> MinerScore {
        self.scores.get(miner).cloned().unwrap_or_else(MinerScore::identity)
    }

    pub fn window(&self, chain: &str) -> Option<&HashrateWindow> {
        self.windows.get(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capped_contribution_never_exceeds_fifty() {
        let mut engine = ScoringEngine::new(ScoringConfig::default());
        engine.update_chain_stats("btc", 1000.0, 0, 10_000.0, 1);
        let network_hr = 1000.0 * HASHRATE_FACTOR;
        let shares_for_60pct = (network_hr * 0.60 / (10_000.0 * HASHRATE_FACTOR)).ceil() as u64;
        for _ in 0..shares_for_60pct {
            engine.record_miner_share("miner-x", "btc");
        }
        engine.rebuild_miner_hashrates(10_000.0);
        assert!(engine.is_miner_capped_on_chain("miner-x", "btc"));
        engine.recompute_scores();
        let score = engine.score("miner-x");
        assert!((score.chain_contributions["btc"] - 50.0).abs() < 1e-6);
    }

    #[test]
    fn zero_score_is_identity() {
        let mut engine = ScoringEngine::new(ScoringConfig::default());
        engine.update_chain_stats("btc", 1000.0, 0, 10_000.0, 1);
        engine.rebuild_miner_hashrates(10_000.0);
        engine.recompute_scores();
        let score = engine.score("nobody");
        assert_eq!(score.luck_multiplier, 1.0);
        assert_eq!(score.total_score, 0.0);
    }

    #[test]
    fn luck_scaling_matches_s6_two_chain_example() {
        // §8 S6: two capped 50% contributions -> HHI 0.5 -> luck ~1.017.
        let mut engine = ScoringEngine::new(ScoringConfig::default());
        engine.update_chain_stats("c1", 1000.0, 0, 10_000.0, 1);
        engine.update_chain_stats("c2", 1000.0, 0, 10_000.0, 1);
        let network_hr = 1000.0 * HASHRATE_FACTOR;
        let shares_for_50pct = (network_hr * 0.50 / (10_000.0 * HASHRATE_FACTOR)).ceil() as u64;
        for _ in 0..shares_for_50pct {
            engine.record_miner_share("miner-y", "c1");
            engine.record_miner_share("miner-y", "c2");
        }
        engine.rebuild_miner_hashrates(10_000.0);
        engine.recompute_scores();
        let score = engine.score("miner-y");
        assert!((score.luck_multiplier - 1.017).abs() < 0.01);
    }

    #[test]
    fn luck_clamps_at_max_for_highly_decentralized_miner() {
        // §8 S6: ten equal 10% contributions -> HHI 0.1 -> raw luck ~3.16, clamped to 3.0.
        let mut engine = ScoringEngine::new(ScoringConfig::default());
        let network_hr = 1000.0 * HASHRATE_FACTOR;
        let shares_for_10pct = (network_hr * 0.10 / (10_000.0 * HASHRATE_FACTOR)).ceil() as u64;
        for i in 0..10 {
            let chain = format!("c{i}");
            engine.update_chain_stats(&chain, 1000.0, 0, 10_000.0, 1);
            for _ in 0..shares_for_10pct {
                engine.record_miner_share("miner-z", &chain);
            }
        }
        engine.rebuild_miner_hashrates(10_000.0);
        engine.recompute_scores();
        let score = engine.score("miner-z");
        assert_eq!(score.luck_multiplier, 3.0);
    }

    #[test]
    fn reward_shares_sum_to_one_across_miners() {
        let mut engine = ScoringEngine::new(ScoringConfig::default());
        engine.update_chain_stats("btc", 1000.0, 0, 10_000.0, 1);
        let network_hr = 1000.0 * HASHRATE_FACTOR;
        let shares_for_10pct = (network_hr * 0.10 / (10_000.0 * HASHRATE_FACTOR)).ceil() as u64;
        for _ in 0..shares_for_10pct {
            engine.record_miner_share("a", "btc");
        }
        for _ in 0..(shares_for_10pct * 2) {
            engine.record_miner_share("b", "btc");
        }
        engine.rebuild_miner_hashrates(10_000.0);
        engine.recompute_scores();
        let total: f64 = ["a", "b"].iter().map(|m| engine.score(m).reward_share).sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn adjusted_target_scales_with_luck_and_clamps_to_max() {
        let mut engine = ScoringEngine::new(ScoringConfig::default());
        engine.update_chain_stats("btc", 1000.0, 0, 10_000.0, 1);
        engine.rebuild_miner_hashrates(10_000.0);
        engine.recompute_scores();
        let base = [0x10u8; 32];
        let max = [0xffu8; 32];
        let adjusted = engine.adjusted_secondary_target(base, "nobody", max);
        assert_eq!(adjusted, base);
    }
}
