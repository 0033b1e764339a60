//! `Job`: the unit sent to miners (§3).

use serde::{Deserialize, Serialize};

use crate::{AlgorithmId, Hash256, ParentSnapshot, SecondaryTemplate};

/// One (parent template, secondary template, commitment) triple issued to
/// miners. Built by the Job Builder (§4.C), dispatched by the Session State
/// Machine (§4.E), consumed by the Share Validator (§4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Ascending hex rendering of a monotonically increasing counter.
    pub job_id: String,
    pub algorithm: AlgorithmId,
    /// Parent snapshot *after* merge-mining tag injection (§4.A/§4.C).
    pub parent_snapshot: ParentSnapshot,
    pub secondary_template: SecondaryTemplate,
    pub secondary_target: Hash256,
    /// Commitment to the secondary block hash, salted by its chain id.
    pub aux_merkle_root: Hash256,
    /// The byte blob injected into the parent coinbase.
    pub merge_mining_tag: Vec<u8>,
    pub created_at: u64,
}

impl Job {
    pub fn parent_target(&self) -> Hash256 {
        self.parent_snapshot.target
    }

    /// A job is still acceptable for late submissions until
    /// `10 * job_timeout_seconds` after creation (§3 lifecycle, §4.C).
    pub fn is_expired(&self, now: u64, job_timeout_seconds: u64) -> bool {
        now.saturating_sub(self.created_at) >= 10 * job_timeout_seconds
    }
}

