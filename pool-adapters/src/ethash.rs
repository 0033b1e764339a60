//! Adapter for the Ethash-family `eth_getWork` / `eth_submitWork` RPC pair
//! (§4.A). `eth_getWork` returns only a header hash, seed hash and target —
//! the merge-mining tag cannot be embedded in-header, so it is carried
//! untouched in the snapshot and attached to the AuxPoW side-data instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pool_core::{AlgorithmId, CoinbaseData, Hash256, ParentChainConfig, ParentSnapshot};
use pool_crypto::PowBackend;
use serde::Deserialize;
use serde_json::json;

use crate::{AdapterError, AuxPow, ParentAdapter};

pub struct EthashAdapter {
    config: ParentChainConfig,
    pow_backend: Arc<dyn PowBackend>,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<[String; 3]>,
    error: Option<serde_json::Value>,
}

impl EthashAdapter {
    pub fn new(config: ParentChainConfig, pow_backend: Arc<dyn PowBackend>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        EthashAdapter {
            config,
            pow_backend,
            http,
        }
    }

    async fn rpc_call(&self, method: &str, params: serde_json::Value) -> Result<[String; 3], AdapterError> {
        let url = format!("http://{}:{}/", self.config.daemon_host, self.config.daemon_port);
        let resp: RpcResponse = self
            .http
            .post(url)
            .json(&json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params}))
            .send()
            .await?
            .json()
            .await?;
        if let Some(err) = resp.error {
            return Err(AdapterError::DaemonError(err.to_string()));
        }
        resp.result
            .ok_or_else(|| AdapterError::DaemonError("empty result".to_string()))
    }
}

#[async_trait]
impl ParentAdapter for EthashAdapter {
    fn algorithm(&self) -> AlgorithmId {
        AlgorithmId::Ethash
    }

    async fn get_block_template(&self, _reserve_size: usize) -> Result<ParentSnapshot, AdapterError> {
        let [header_hash, seed_hash, target_hex] = self.rpc_call("eth_getWork", json!([])).await?;
        let header = hex_to_hash(&header_hash)?;
        let seed = hex_to_hash(&seed_hash)?;
        let target = hex_to_full_target(&target_hex)?;

        // The header carries no reserve region to overwrite; the empty
        // coinbase stands in so the AuxPoW side-channel still has a place
        // to carry `merge_mining_tag` (§4.A).
        let coinbase_data = CoinbaseData {
            bytes: Vec::new(),
            merkle_branch: Vec::new(),
            coinbase_index: 0,
            merkle_root: [0u8; 32],
            reserve_offset: 0,
            reserve_size: 0,
        };

        Ok(ParentSnapshot {
            hashing_blob: header.to_vec(),
            full_template: header.to_vec(),
            seed_hash: Some(seed),
            height: 0,
            difficulty: pool_consensus::target_to_difficulty(AlgorithmId::Ethash, &target),
            target,
            coinbase_data,
        })
    }

    async fn inject_tag(
        &self,
        snapshot: &ParentSnapshot,
        _merge_tag: &[u8],
    ) -> Result<ParentSnapshot, AdapterError> {
        // No-op: Ethash headers cannot carry the tag; the caller attaches it
        // to the AuxPoW record instead via `create_aux_pow`.
        Ok(snapshot.clone())
    }

    fn calculate_pow_hash(&self, hashing_blob: &[u8], seed_hash: Option<&Hash256>) -> Hash256 {
        self.pow_backend
            .pow_hash(AlgorithmId::Ethash, hashing_blob, seed_hash)
            .unwrap_or([0xffu8; 32])
    }

    async fn submit_block(&self, full_template: &[u8]) -> Result<(), AdapterError> {
        // `full_template` here is `nonce(8) || header_hash(32) || mix_hash(32)`,
        // assembled by the Share Validator before calling in (§4.F step 9).
        if full_template.len() != 72 {
            return Err(AdapterError::MalformedTemplate(
                "expected nonce || header_hash || mix_hash".to_string(),
            ));
        }
        let nonce = hex::encode(&full_template[0..8]);
        let header_hash = hex::encode(&full_template[8..40]);
        let mix_hash = hex::encode(&full_template[40..72]);
        self.rpc_call(
            "eth_submitWork",
            json!([format!("0x{nonce}"), format!("0x{header_hash}"), format!("0x{mix_hash}")]),
        )
        .await?;
        Ok(())
    }

    fn create_aux_pow(
        &self,
        _secondary_header: &[u8],
        snapshot: &ParentSnapshot,
        nonce: u32,
        merge_tag: &[u8],
    ) -> AuxPow {
        AuxPow {
            parent_header: snapshot.full_template.clone(),
            parent_coinbase: merge_tag.to_vec(),
            coinbase_merkle_branch: Vec::new(),
            coinbase_merkle_index: nonce,
            chain_id: self.config.chain_id,
        }
    }
}

fn hex_to_hash(s: &str) -> Result<Hash256, AdapterError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(trimmed).map_err(|e| AdapterError::MalformedTemplate(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| AdapterError::MalformedTemplate("expected 32-byte hash".to_string()))
}

fn hex_to_full_target(s: &str) -> Result<Hash256, AdapterError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    let padded = format!("{:0>64}", trimmed);
    hex_to_hash(&padded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ParentChainConfig {
        ParentChainConfig {
            name: "eth-classic".into(),
            algorithm: AlgorithmId::Ethash,
            daemon_host: "127.0.0.1".into(),
            daemon_port: 8545,
            daemon_user: None,
            daemon_password: None,
            wallet_address: "0xpool".into(),
            chain_id: 3,
            enabled: true,
        }
    }

    #[test]
    fn short_target_hex_is_left_padded_to_32_bytes() {
        let target = hex_to_full_target("0xffff").unwrap();
        assert_eq!(&target[30..], &[0xff, 0xff]);
        assert_eq!(target[0], 0);
    }

    #[test]
    fn create_aux_pow_carries_merge_tag_as_coinbase() {
        let adapter = EthashAdapter::new(sample_config(), Arc::new(pool_crypto::StandardPowBackend));
        let snapshot = ParentSnapshot {
            hashing_blob: vec![1u8; 32],
            full_template: vec![1u8; 32],
            seed_hash: Some([2u8; 32]),
            height: 0,
            difficulty: 1.0,
            target: [0xffu8; 32],
            coinbase_data: CoinbaseData {
                bytes: vec![],
                merkle_branch: vec![],
                coinbase_index: 0,
                merkle_root: [0u8; 32],
                reserve_offset: 0,
                reserve_size: 0,
            },
        };
        let aux = adapter.create_aux_pow(&[], &snapshot, 7, b"tag-bytes");
        assert_eq!(aux.parent_coinbase, b"tag-bytes");
        assert_eq!(aux.coinbase_merkle_index, 7);
    }
}
