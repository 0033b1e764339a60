//! Shared data model for the WATTx merged-mining pool (§3 of the pool spec).
//!
//! This crate defines the value types that flow between the other
//! components — it owns no sockets, no RPC clients, and no background
//! tasks. Everything here is plain data plus the small amount of
//! validation logic the data model's own invariants call for.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod algorithm;
pub mod job;
pub mod scoring;
pub mod session;
pub mod snapshot;

pub use algorithm::AlgorithmId;
pub use job::Job;
pub use scoring::{HashrateWindow, MinerScore};
pub use session::{Session, SessionCounters, SessionFlags};
pub use snapshot::{CoinbaseData, ParentSnapshot, SecondaryTemplate};

/// 32-byte hash / target type used throughout the pipeline.
pub type Hash256 = [u8; 32];

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

/// Static configuration for one parent chain (§3 `ParentChainConfig`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentChainConfig {
    pub name: String,
    pub algorithm: AlgorithmId,
    pub daemon_host: String,
    pub daemon_port: u16,
    pub daemon_user: Option<String>,
    pub daemon_password: Option<String>,
    /// The pool's own payout address on this chain.
    pub wallet_address: String,
    /// Numeric chain id used in the AuxPoW chain-id field.
    pub chain_id: u32,
    pub enabled: bool,
}

/// Top-level pool configuration enumerated in spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub bind_address: String,
    pub base_port: u16,
    pub max_clients_per_algo: usize,
    pub job_timeout_seconds: u64,
    pub share_difficulty: f64,
    pub hashrate_update_interval_seconds: u64,
    pub max_nethash_percent_per_chain: f64,
    pub min_luck_multiplier: f64,
    pub max_luck_multiplier: f64,
    pub secondary_chain_id: u32,
    pub pool_secondary_address: String,
    pub parents: Vec<ParentChainConfig>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            bind_address: "0.0.0.0".to_string(),
            base_port: 3337,
            max_clients_per_algo: 10_000,
            job_timeout_seconds: 30,
            share_difficulty: 10_000.0,
            hashrate_update_interval_seconds: 60,
            max_nethash_percent_per_chain: 50.0,
            min_luck_multiplier: 0.5,
            max_luck_multiplier: 3.0,
            secondary_chain_id: 1,
            pool_secondary_address: "wtx1pooldefault".to_string(),
            parents: Vec::new(),
        }
    }
}

/// Monotonic time helper shared by session/job aging logic.
pub fn elapsed_secs(since: Instant) -> u64 {
    since.elapsed().as_secs()
}

/// A share/block event queued for the external rewards channel (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareSubmission {
    pub secondary_address: String,
    pub shares: u64,
    pub parent_valid: bool,
    pub secondary_valid: bool,
    pub parent_height: u64,
    pub secondary_height: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockFound {
    pub secondary_address: String,
    pub chain: String,
    pub height: u64,
    pub timestamp: u64,
}

/// The external rewards side channel (§6), consumed from the Share
/// Validator (§4.F step 10). Kept as a trait here, next to the event types
/// it carries, so `pool-server` can queue events without depending on
/// `pool-rewards`'s batching/ABI-encoding implementation.
pub trait RewardsSink: Send + Sync {
    fn submit_share(&self, event: ShareSubmission);
    fn submit_block(&self, event: BlockFound);
}

/// Aggregate, read-only pool statistics (supplementary feature, SPEC_FULL §2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolStats {
    pub connected_clients: HashMap<AlgorithmId, usize>,
    pub shares_accepted: HashMap<AlgorithmId, u64>,
    pub shares_rejected: HashMap<AlgorithmId, u64>,
    pub blocks_found: HashMap<AlgorithmId, u64>,
    pub current_job_ids: HashMap<AlgorithmId, String>,
}
