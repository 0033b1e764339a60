//! Shared helpers for the WATTx merged-mining pool.
//!
//! Kept deliberately small: encoding helpers, timestamp formatting, random
//! hex-id generation, and the login-string grammar shared by the Stratum
//! and XMRig-style login paths (§4.E / §6 of the pool spec).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UtilError {
    #[error("Hex decoding error: {0}")]
    HexError(#[from] hex::FromHexError),

    #[error("Base58 decoding error: {0}")]
    Base58Error(#[from] bs58::decode::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Converts a hex string to bytes
pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>, UtilError> {
    Ok(hex::decode(hex)?)
}

/// Converts bytes to a hex string
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Converts a base58 string to bytes
pub fn base58_to_bytes(b58: &str) -> Result<Vec<u8>, UtilError> {
    Ok(bs58::decode(b58).into_vec()?)
}

/// Converts bytes to a base58 string
pub fn bytes_to_base58(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

/// Formats a timestamp as an ISO 8601 string
pub fn format_timestamp(timestamp: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| "Invalid timestamp".to_string())
}

/// Current unix timestamp in seconds.
pub fn now_secs() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A random lowercase-hex id of `bytes` random bytes.
pub fn random_hex_id(bytes: usize) -> String {
    use rand::RngCore;
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// The parsed form of a miner login string.
///
/// Grammar (§6): `ParentAddress ( "+" SecondaryAddress )? ( "." Worker )?`.
/// Parsing is purely syntactic — the parent address is not validated here;
/// an incorrect address just causes rewards to go nowhere (§4.E).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginFields {
    pub parent_address: String,
    pub secondary_address: Option<String>,
    pub worker: Option<String>,
}

/// Parse a login string of the form `PARENT[+SECONDARY][.WORKER]`.
///
/// Returns `None` only for an empty parent address, since anything else is
/// syntactically acceptable (validation is the adapter's job).
pub fn parse_login(login: &str) -> Option<LoginFields> {
    let (address_part, worker) = match login.split_once('.') {
        Some((a, w)) => (a, Some(w.to_string())),
        None => (login, None),
    };

    let (parent_address, secondary_address) = match address_part.split_once('+') {
        Some((p, s)) => (p.to_string(), Some(s.to_string())),
        None => (address_part.to_string(), None),
    };

    if parent_address.is_empty() {
        return None;
    }

    Some(LoginFields {
        parent_address,
        secondary_address,
        worker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_login() {
        let f = parse_login("bc1qparent+smcSecondary.worker1").unwrap();
        assert_eq!(f.parent_address, "bc1qparent");
        assert_eq!(f.secondary_address.as_deref(), Some("smcSecondary"));
        assert_eq!(f.worker.as_deref(), Some("worker1"));
    }

    #[test]
    fn parses_parent_only() {
        let f = parse_login("bc1qparent").unwrap();
        assert_eq!(f.parent_address, "bc1qparent");
        assert_eq!(f.secondary_address, None);
        assert_eq!(f.worker, None);
    }

    #[test]
    fn parses_parent_and_worker_without_secondary() {
        let f = parse_login("bc1qparent.rig1").unwrap();
        assert_eq!(f.parent_address, "bc1qparent");
        assert_eq!(f.secondary_address, None);
        assert_eq!(f.worker.as_deref(), Some("rig1"));
    }

    #[test]
    fn rejects_empty_parent_address() {
        assert!(parse_login("").is_none());
        assert!(parse_login(".worker").is_none());
    }

    #[test]
    fn hex_id_has_requested_length() {
        let id = random_hex_id(16);
        assert_eq!(id.len(), 32);
    }
}
