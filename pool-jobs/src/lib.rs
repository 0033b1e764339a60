//! Job Builder (§4.C): combines the latest `ParentSnapshot` for an
//! algorithm's primary parent with a fresh `SecondaryTemplate`, computes the
//! merge-mining commitment, and emits a `Job` that the Connection Manager
//! dispatches to miners.
//!
//! Grounded on the teacher's `StratumServer`/`MiningJobManager` split
//! (`mining/src/stratum.rs`, `mining/src/lib.rs`): a background task holds
//! the canonical job state and a `watch` channel fans the latest job out to
//! whoever is bound to it, the same role `StratumServer::broadcast_job`
//! plays there.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use pool_adapters::{AuxPow, ParentAdapter};
use pool_core::{AlgorithmId, Job, ParentSnapshot, SecondaryTemplate};
use thiserror::Error;
use tokio::sync::{watch, Notify};

pub mod commitment;
pub mod table;

pub use commitment::{build_merge_mining_tag, commit_of};
pub use table::JobTable;

#[derive(Debug, Error)]
pub enum JobsError {
    #[error("secondary chain request failed: {0}")]
    Secondary(String),
    #[error("adapter error: {0}")]
    Adapter(#[from] pool_adapters::AdapterError),
}

/// §6 "Secondary chain submission": the capability the Job Builder and
/// Share Validator use to talk to the secondary chain node. Out of scope
/// per §1 ("the secondary-chain node ... accessed through a `Mining`
/// capability"); this crate only depends on the trait boundary.
#[async_trait]
pub trait SecondaryMining: Send + Sync {
    async fn get_block_template(&self) -> Result<SecondaryTemplate, JobsError>;

    async fn submit_solution(
        &self,
        version: u32,
        time: u32,
        nonce: u32,
        coinbase: &[u8],
    ) -> Result<(), JobsError>;

    async fn submit_aux_pow_solution(
        &self,
        version_with_aux_flag: u32,
        time: u32,
        coinbase: &[u8],
        aux_pow: &AuxPow,
    ) -> Result<(), JobsError>;
}

/// Single-version bit marking an AuxPoW block (§6).
pub const AUX_POW_FLAG: u32 = 1 << 8;

/// One Job Builder task per algorithm (§4.C).
pub struct JobBuilder {
    algorithm: AlgorithmId,
    adapter: Arc<dyn ParentAdapter>,
    parent_snapshot: watch::Receiver<Option<ParentSnapshot>>,
    secondary: Arc<dyn SecondaryMining>,
    secondary_chain_id: u32,
    job_timeout: Duration,
    table: Arc<Mutex<JobTable>>,
    job_tx: watch::Sender<Option<Job>>,
}

impl JobBuilder {
    pub fn new(
        algorithm: AlgorithmId,
        adapter: Arc<dyn ParentAdapter>,
        parent_snapshot: watch::Receiver<Option<ParentSnapshot>>,
        secondary: Arc<dyn SecondaryMining>,
        secondary_chain_id: u32,
        job_timeout: Duration,
    ) -> (Self, watch::Receiver<Option<Job>>) {
        let (job_tx, job_rx) = watch::channel(None);
        (
            JobBuilder {
                algorithm,
                adapter,
                parent_snapshot,
                secondary,
                secondary_chain_id,
                job_timeout,
                table: Arc::new(Mutex::new(JobTable::new())),
                job_tx,
            },
            job_rx,
        )
    }

    pub fn table(&self) -> Arc<Mutex<JobTable>> {
        self.table.clone()
    }

    /// Runs until `running` flips to false (§5): wakes on `job_wake` being
    /// signalled by the poller, or on the fixed `job_timeout` fallback,
    /// whichever comes first.
    pub async fn run(mut self, job_wake: Arc<Notify>, running: Arc<std::sync::atomic::AtomicBool>) {
        while running.load(std::sync::atomic::Ordering::Relaxed) {
            tokio::select! {
                _ = job_wake.notified() => {}
                _ = tokio::time::sleep(self.job_timeout) => {}
            }
            if !running.load(std::sync::atomic::Ordering::Relaxed) {
                break;
            }
            if let Err(e) = self.build_once().await {
                warn!("{}: job build failed: {e}", self.algorithm);
            }
            self.table
                .lock()
                .unwrap()
                .evict_expired(pool_util::now_secs(), self.job_timeout.as_secs());
        }
    }

    /// One pass of steps 2-8 from §4.C.
    async fn build_once(&mut self) -> Result<(), JobsError> {
        let snapshot = self
            .parent_snapshot
            .borrow_and_update()
            .clone()
            .ok_or_else(|| JobsError::Secondary("no parent snapshot yet".to_string()))?;

        let secondary_template = self.secondary.get_block_template().await?;

        let aux_merkle_root = commit_of(&secondary_template.block_hash, self.secondary_chain_id);
        let merge_mining_tag = build_merge_mining_tag(&aux_merkle_root, self.secondary_chain_id);

        let injected = self.adapter.inject_tag(&snapshot, &merge_mining_tag).await?;

        let secondary_target = pool_consensus::bits_to_target(secondary_template.target_bits);

        let job_id = self.table.lock().unwrap().next_job_id();
        let job = Job {
            job_id,
            algorithm: self.algorithm,
            parent_snapshot: injected,
            secondary_template,
            secondary_target,
            aux_merkle_root,
            merge_mining_tag,
            created_at: pool_util::now_secs(),
        };

        debug!("{}: built job {}", self.algorithm, job.job_id);
        self.table.lock().unwrap().insert(job.clone());
        let _ = self.job_tx.send(Some(job));
        Ok(())
    }
}

/// Per-algorithm current-job state shared between the Job Builder and the
/// Connection Manager: the live `watch` receiver plus the id-indexed table
/// used to validate late submissions (§3 Job lifecycle).
#[derive(Clone)]
pub struct JobHandle {
    pub current: watch::Receiver<Option<Job>>,
    pub table: Arc<Mutex<JobTable>>,
}

/// Convenience map built by the server's wiring code: one `JobHandle` per
/// configured algorithm.
pub type JobHandles = HashMap<AlgorithmId, JobHandle>;
