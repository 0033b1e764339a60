//! Adapter for the Monero/RandomX `/json_rpc` daemon family (§4.A).
//!
//! Reconstructs the 76-byte `blockhashing_blob` (major/minor version, varint
//! timestamp, 32-byte prev-id, 4-byte nonce, 32-byte tree root, padded)
//! after every tag injection, using the daemon-reported `reserved_offset`
//! rather than parsing the coinbase `extra` field's TLV structure ourselves.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pool_core::{AlgorithmId, CoinbaseData, Hash256, ParentChainConfig, ParentSnapshot};
use pool_crypto::{apply_merkle_branch, keccak256, PowBackend};
use serde::Deserialize;
use serde_json::json;

use crate::{AdapterError, ParentAdapter};

/// Requested reserve region size for Monero-family `get_block_template`
/// calls (§4.A: "`reserve_size` = 194").
const RESERVE_SIZE: usize = 194;

const HASHING_BLOB_LEN: usize = 76;
const TIMESTAMP_FIELD_LEN: usize = 5;
const ROOT_OFFSET: usize = 2 + TIMESTAMP_FIELD_LEN + 32 + 4;

pub struct MoneroAdapter {
    config: ParentChainConfig,
    pow_backend: Arc<dyn PowBackend>,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GetBlockTemplateResult {
    height: u64,
    difficulty: u64,
    prev_hash: String,
    reserved_offset: usize,
    blocktemplate_blob: String,
    #[serde(default)]
    seed_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcEnvelope<T> {
    result: Option<T>,
    error: Option<serde_json::Value>,
}

impl MoneroAdapter {
    pub fn new(config: ParentChainConfig, pow_backend: Arc<dyn PowBackend>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        MoneroAdapter {
            config,
            pow_backend,
            http,
        }
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, AdapterError> {
        let url = format!("http://{}:{}/json_rpc", self.config.daemon_host, self.config.daemon_port);
        let mut req = self.http.post(url).json(&json!({
            "jsonrpc": "2.0",
            "id": "pool",
            "method": method,
            "params": params,
        }));
        if let Some(user) = &self.config.daemon_user {
            req = req.basic_auth(user, self.config.daemon_password.as_ref());
        }
        let resp: JsonRpcEnvelope<serde_json::Value> = req.send().await?.json().await?;
        if let Some(err) = resp.error {
            return Err(AdapterError::DaemonError(err.to_string()));
        }
        resp.result
            .ok_or_else(|| AdapterError::DaemonError("empty result".to_string()))
    }

    fn build_hashing_blob_bytes(major_minor: (u8, u8), timestamp: u64, prev_id: &Hash256, nonce: u32, root: &Hash256) -> Vec<u8> {
        let mut blob = Vec::with_capacity(HASHING_BLOB_LEN);
        blob.push(major_minor.0);
        blob.push(major_minor.1);
        blob.extend_from_slice(&fixed_width_varint(timestamp));
        blob.extend_from_slice(prev_id);
        blob.extend_from_slice(&nonce.to_le_bytes());
        blob.extend_from_slice(root);
        blob.resize(HASHING_BLOB_LEN, 0);
        blob
    }
}

#[async_trait]
impl ParentAdapter for MoneroAdapter {
    fn algorithm(&self) -> AlgorithmId {
        AlgorithmId::RandomX
    }

    async fn get_block_template(&self, _reserve_size: usize) -> Result<ParentSnapshot, AdapterError> {
        let raw = self
            .call(
                "get_block_template",
                json!({"wallet_address": self.config.wallet_address, "reserve_size": RESERVE_SIZE}),
            )
            .await?;
        let template: GetBlockTemplateResult = serde_json::from_value(raw)
            .map_err(|e| AdapterError::MalformedTemplate(e.to_string()))?;

        let blob = hex::decode(&template.blocktemplate_blob)
            .map_err(|e| AdapterError::MalformedTemplate(e.to_string()))?;
        let prev_id = hex_to_hash(&template.prev_hash)?;
        let seed_hash = template
            .seed_hash
            .as_deref()
            .map(hex_to_hash)
            .transpose()?;

        if template.reserved_offset + RESERVE_SIZE > blob.len() {
            return Err(AdapterError::MalformedTemplate(
                "reserved region exceeds template length".to_string(),
            ));
        }

        let coinbase_hash = keccak256(&blob);
        let tree_root = coinbase_hash; // single-leaf tree: root == the only leaf

        let timestamp = pool_util::now_secs();
        let hashing_blob = Self::build_hashing_blob_bytes((14, 14), timestamp, &prev_id, 0, &tree_root);

        let coinbase_data = CoinbaseData {
            bytes: blob.clone(),
            merkle_branch: Vec::new(),
            coinbase_index: 0,
            merkle_root: tree_root,
            reserve_offset: template.reserved_offset,
            reserve_size: RESERVE_SIZE,
        };
        coinbase_data.validate()?;

        Ok(ParentSnapshot {
            hashing_blob,
            full_template: blob,
            seed_hash,
            height: template.height,
            difficulty: template.difficulty as f64,
            target: pool_consensus::difficulty_to_target(AlgorithmId::RandomX, template.difficulty as f64),
            coinbase_data,
        })
    }

    async fn inject_tag(
        &self,
        snapshot: &ParentSnapshot,
        merge_tag: &[u8],
    ) -> Result<ParentSnapshot, AdapterError> {
        let mut injected = snapshot.clone();
        let new_blob = snapshot.coinbase_data.with_reserve_overwritten(merge_tag)?;
        let new_leaf = keccak256(&new_blob);
        let new_root = apply_merkle_branch(new_leaf, &snapshot.coinbase_data.merkle_branch, 0, |a, b| {
            let mut buf = [0u8; 64];
            buf[..32].copy_from_slice(a);
            buf[32..].copy_from_slice(b);
            keccak256(&buf)
        });

        injected.coinbase_data.bytes = new_blob.clone();
        injected.coinbase_data.merkle_root = new_root;
        injected.full_template = new_blob;

        let mut hashing_blob = snapshot.hashing_blob.clone();
        if hashing_blob.len() >= ROOT_OFFSET + 32 {
            hashing_blob[ROOT_OFFSET..ROOT_OFFSET + 32].copy_from_slice(&new_root);
        }
        injected.hashing_blob = hashing_blob;
        Ok(injected)
    }

    fn calculate_pow_hash(&self, hashing_blob: &[u8], seed_hash: Option<&Hash256>) -> Hash256 {
        self.pow_backend
            .pow_hash(AlgorithmId::RandomX, hashing_blob, seed_hash)
            .unwrap_or([0xffu8; 32])
    }

    async fn submit_block(&self, full_template: &[u8]) -> Result<(), AdapterError> {
        self.call("submit_block", json!([hex::encode(full_template)])).await?;
        Ok(())
    }
}

fn fixed_width_varint(mut value: u64) -> [u8; TIMESTAMP_FIELD_LEN] {
    let mut out = [0u8; TIMESTAMP_FIELD_LEN];
    for slot in out.iter_mut() {
        *slot = (value & 0xff) as u8;
        value >>= 8;
    }
    out
}

fn hex_to_hash(s: &str) -> Result<Hash256, AdapterError> {
    let bytes = hex::decode(s).map_err(|e| AdapterError::MalformedTemplate(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| AdapterError::MalformedTemplate("expected 32-byte hash".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ParentChainConfig {
        ParentChainConfig {
            name: "monero".into(),
            algorithm: AlgorithmId::RandomX,
            daemon_host: "127.0.0.1".into(),
            daemon_port: 18081,
            daemon_user: None,
            daemon_password: None,
            wallet_address: "4xyz".into(),
            chain_id: 2,
            enabled: true,
        }
    }

    #[test]
    fn hashing_blob_is_exactly_76_bytes() {
        let blob = MoneroAdapter::build_hashing_blob_bytes((14, 14), 1_700_000_000, &[1u8; 32], 0, &[2u8; 32]);
        assert_eq!(blob.len(), HASHING_BLOB_LEN);
    }

    #[tokio::test]
    async fn inject_tag_patches_root_in_hashing_blob() {
        let adapter = MoneroAdapter::new(sample_config(), Arc::new(pool_crypto::StandardPowBackend));
        let bytes = vec![0u8; 300];
        let coinbase_data = CoinbaseData {
            bytes,
            merkle_branch: vec![],
            coinbase_index: 0,
            merkle_root: [0u8; 32],
            reserve_offset: 50,
            reserve_size: RESERVE_SIZE,
        };
        let snapshot = ParentSnapshot {
            hashing_blob: MoneroAdapter::build_hashing_blob_bytes((14, 14), 1, &[0u8; 32], 0, &[0u8; 32]),
            full_template: coinbase_data.bytes.clone(),
            seed_hash: Some([9u8; 32]),
            height: 100,
            difficulty: 1000.0,
            target: [0xffu8; 32],
            coinbase_data,
        };
        let injected = adapter.inject_tag(&snapshot, &[1, 2, 3]).await.unwrap();
        assert_ne!(injected.hashing_blob[ROOT_OFFSET..ROOT_OFFSET + 32], snapshot.hashing_blob[ROOT_OFFSET..ROOT_OFFSET + 32]);
        assert_eq!(injected.hashing_blob.len(), HASHING_BLOB_LEN);
    }
}
