//! The id-indexed job table (§3 Job lifecycle): "entries in the table age
//! out after 10x job-timeout", letting late submissions validate against
//! the template they were issued under (§4.C).

use std::collections::HashMap;

use pool_core::Job;

/// Monotonically increasing job-id counter, rendered as ascending hex —
/// shared across a single algorithm's Job Builder.
#[derive(Debug, Default)]
struct IdCounter(u64);

impl IdCounter {
    fn next(&mut self) -> String {
        let id = self.0;
        self.0 += 1;
        format!("{:x}", id)
    }
}

/// Per-algorithm job table: the "current job" slot plus the id -> job map
/// used to validate late submissions.
#[derive(Default)]
pub struct JobTable {
    ids: IdCounter,
    jobs: HashMap<String, Job>,
    current_id: Option<String>,
}

impl JobTable {
    pub fn new() -> Self {
        JobTable::default()
    }

    pub fn next_job_id(&mut self) -> String {
        self.ids.next()
    }

    pub fn insert(&mut self, job: Job) {
        self.current_id = Some(job.job_id.clone());
        self.jobs.insert(job.job_id.clone(), job);
    }

    pub fn get(&self, job_id: &str) -> Option<&Job> {
        self.jobs.get(job_id)
    }

    pub fn current(&self) -> Option<&Job> {
        self.current_id.as_ref().and_then(|id| self.jobs.get(id))
    }

    /// Drops jobs older than `10 * job_timeout_seconds` (§3).
    pub fn evict_expired(&mut self, now: u64, job_timeout_seconds: u64) {
        self.jobs.retain(|_, job| !job.is_expired(now, job_timeout_seconds));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pool_core::{AlgorithmId, CoinbaseData, ParentSnapshot, SecondaryTemplate};

    fn sample_job(id: &str, created_at: u64) -> Job {
        Job {
            job_id: id.to_string(),
            algorithm: AlgorithmId::Sha256d,
            parent_snapshot: ParentSnapshot {
                hashing_blob: vec![],
                full_template: vec![],
                seed_hash: None,
                height: 1,
                difficulty: 1.0,
                target: [0xffu8; 32],
                coinbase_data: CoinbaseData {
                    bytes: vec![0u8; 8],
                    merkle_branch: vec![],
                    coinbase_index: 0,
                    merkle_root: [0u8; 32],
                    reserve_offset: 0,
                    reserve_size: 4,
                },
            },
            secondary_template: SecondaryTemplate {
                header_bytes: vec![],
                coinbase_tx: vec![],
                target_bits: 0x1d00ffff,
                height: 1,
                handle: "h".to_string(),
                block_hash: [0u8; 32],
            },
            secondary_target: [0xffu8; 32],
            aux_merkle_root: [0u8; 32],
            merge_mining_tag: vec![],
            created_at,
        }
    }

    #[test]
    fn evicts_only_jobs_past_ten_times_timeout() {
        let mut table = JobTable::new();
        table.insert(sample_job("0", 0));
        table.insert(sample_job("1", 290));
        table.evict_expired(300, 30);
        assert!(table.get("0").is_none());
        assert!(table.get("1").is_some());
    }

    #[test]
    fn current_tracks_most_recently_inserted() {
        let mut table = JobTable::new();
        table.insert(sample_job("0", 0));
        table.insert(sample_job("1", 0));
        assert_eq!(table.current().unwrap().job_id, "1");
    }
}
