//! Per-connection session state (§3 `Session`).
//!
//! The socket handle itself lives in `pool-server`, which owns I/O; this
//! struct is the protocol-level state that travels with a connection:
//! login fields, flags, and per-chain counters.

use std::collections::HashMap;
use std::time::Instant;

use crate::AlgorithmId;

#[derive(Debug, Clone, Default)]
pub struct SessionFlags {
    pub authorized: bool,
    pub subscribed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SessionCounters {
    pub accepted_shares: HashMap<String, u64>,
    pub rejected_shares: u64,
    pub blocks_found: u64,
}

impl SessionCounters {
    pub fn record_accepted(&mut self, chain: &str) {
        *self.accepted_shares.entry(chain.to_string()).or_insert(0) += 1;
    }

    pub fn total_accepted(&self, chain: &str) -> u64 {
        self.accepted_shares.get(chain).copied().unwrap_or(0)
    }
}

/// Per-connection state, keyed by a random 16-byte session id.
#[derive(Debug)]
pub struct Session {
    pub session_id: String,
    pub algorithm: AlgorithmId,
    /// Address on the primary parent chain for this algorithm.
    pub parent_address: String,
    /// Defaults to the pool's configured secondary address.
    pub secondary_address: String,
    pub worker_name: Option<String>,
    pub flags: SessionFlags,
    pub counters: SessionCounters,
    pub connected_at: Instant,
    pub last_activity: Instant,
    /// Per-connection extranonce1, assigned on subscribe (Stratum variant).
    pub extranonce1: String,
}

impl Session {
    pub fn new(session_id: String, algorithm: AlgorithmId, pool_secondary_address: String) -> Self {
        let now = Instant::now();
        Session {
            session_id,
            algorithm,
            parent_address: String::new(),
            secondary_address: pool_secondary_address,
            worker_name: None,
            flags: SessionFlags::default(),
            counters: SessionCounters::default(),
            connected_at: now,
            last_activity: now,
            extranonce1: String::new(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_secs(&self) -> u64 {
        self.last_activity.elapsed().as_secs()
    }

    /// Apply a parsed login string, defaulting the secondary address only
    /// when the miner didn't supply one (§6 "Missing SecondaryAddress
    /// defaults to the pool's configured secondary address").
    pub fn apply_login(
        &mut self,
        fields: pool_util::LoginFields,
        pool_secondary_address: &str,
    ) {
        self.parent_address = fields.parent_address;
        self.secondary_address = fields
            .secondary_address
            .unwrap_or_else(|| pool_secondary_address.to_string());
        self.worker_name = fields.worker;
        self.flags.authorized = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_defaults_secondary_address() {
        let mut s = Session::new("abc".into(), AlgorithmId::Sha256d, "pool-default".into());
        let fields = pool_util::parse_login("bc1qminer.rig1").unwrap();
        s.apply_login(fields, "pool-default");
        assert_eq!(s.secondary_address, "pool-default");
        assert!(s.flags.authorized);
    }

    #[test]
    fn login_honors_explicit_secondary_address() {
        let mut s = Session::new("abc".into(), AlgorithmId::Sha256d, "pool-default".into());
        let fields = pool_util::parse_login("bc1qminer+wtx1explicit.rig1").unwrap();
        s.apply_login(fields, "pool-default");
        assert_eq!(s.secondary_address, "wtx1explicit");
    }
}
