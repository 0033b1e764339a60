//! Wire format (§6): line-delimited JSON objects. Requests carry `id`,
//! `method`, and either a positional `params` array or a keyed `params`
//! object (XMRig variant). Responses carry `id`, `jsonrpc:"2.0"`, and
//! either `result` or `error:{code, message}`.
//!
//! Grounded on the teacher's `StratumRequest`/`StratumResponse`
//! (`mining/src/stratum.rs`), generalized to accept either params shape
//! instead of assuming a positional array.

use pool_core::Job;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        RpcError {
            code,
            message: message.into(),
        }
    }

    pub fn unknown_method() -> Self {
        RpcError::new(-1, "Unknown method")
    }

    pub fn invalid_share() -> Self {
        RpcError::new(-1, "Invalid share")
    }

    pub fn not_authorized() -> Self {
        RpcError::new(-1, "Not authorized")
    }
}

/// Builds a success response line: `{id, jsonrpc, result}`.
pub fn ok_response(id: &Value, result: Value) -> String {
    json!({
        "id": id,
        "jsonrpc": "2.0",
        "result": result,
    })
    .to_string()
}

/// Builds an error response line: `{id, jsonrpc, error:{code, message}}`.
pub fn err_response(id: &Value, error: RpcError) -> String {
    json!({
        "id": id,
        "jsonrpc": "2.0",
        "error": {"code": error.code, "message": error.message},
    })
    .to_string()
}

/// `mining.subscribe` reply (§4.E): `[[["mining.notify", session_id]], extranonce1, 4]`.
pub fn subscribe_result(session_id: &str, extranonce1: &str) -> Value {
    json!([[["mining.notify", session_id]], extranonce1, 4])
}

/// The `params` object carried by both the server-initiated job
/// notification and a `getjob` reply's `result` (§6): `{blob, job_id,
/// target, height, seed_hash?}`.
pub fn job_params(job: &Job) -> Value {
    let mut params = json!({
        "blob": hex::encode(&job.parent_snapshot.hashing_blob),
        "job_id": job.job_id,
        "target": lowest_16_hex_digits(&job.parent_snapshot.target),
        "height": job.parent_snapshot.height,
    });
    if let Some(seed) = job.parent_snapshot.seed_hash {
        params["seed_hash"] = json!(hex::encode(seed));
    }
    params
}

/// Server-initiated job notification (§6): `{jsonrpc, method:"job", params:{blob, job_id, target, height, seed_hash?}}`.
pub fn job_notification(job: &Job) -> String {
    json!({
        "jsonrpc": "2.0",
        "method": "job",
        "params": job_params(job),
    })
    .to_string()
}

/// The lowest 16 hex digits of a 256-bit target, little-endian (the
/// convention XMRig-style `target` fields use): the least-significant 8
/// bytes of the big-endian target, byte-reversed.
fn lowest_16_hex_digits(target: &pool_core::Hash256) -> String {
    let mut low = target[24..32].to_vec();
    low.reverse();
    hex::encode(low)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_digits_are_byte_reversed_tail() {
        let mut target = [0u8; 32];
        target[24..32].copy_from_slice(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        assert_eq!(lowest_16_hex_digits(&target), "0807060504030201");
    }
}
