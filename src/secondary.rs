//! Concrete `SecondaryMining` implementation (§6 "a capability yielding an
//! opaque template handle"): an HTTP JSON-RPC client to the secondary
//! chain's own node, in the same request/response shape as the Bitcoin-family
//! parent adapter (`pool-adapters/src/bitcoin_family.rs`).

use std::time::Duration;

use async_trait::async_trait;
use pool_adapters::AuxPow;
use pool_core::SecondaryTemplate;
use pool_jobs::{JobsError, SecondaryMining};
use serde::Deserialize;
use serde_json::json;

pub struct SecondaryRpcClient {
    endpoint: String,
    http: reqwest::Client,
}

impl SecondaryRpcClient {
    pub fn new(endpoint: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        SecondaryRpcClient { endpoint, http }
    }

    async fn rpc_call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, JobsError> {
        let resp: RpcResponse = self
            .http
            .post(&self.endpoint)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": "wattx-pool",
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(|e| JobsError::Secondary(e.to_string()))?
            .json()
            .await
            .map_err(|e| JobsError::Secondary(e.to_string()))?;
        if let Some(err) = resp.error {
            return Err(JobsError::Secondary(err.to_string()));
        }
        resp.result.ok_or_else(|| JobsError::Secondary("empty result".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<serde_json::Value>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TemplateResult {
    header_bytes: String,
    coinbase_tx: String,
    target_bits: u32,
    height: u64,
    handle: String,
    block_hash: String,
}

#[async_trait]
impl SecondaryMining for SecondaryRpcClient {
    async fn get_block_template(&self) -> Result<SecondaryTemplate, JobsError> {
        let raw = self.rpc_call("getblocktemplate", json!([])).await?;
        let t: TemplateResult =
            serde_json::from_value(raw).map_err(|e| JobsError::Secondary(e.to_string()))?;
        let header_bytes = hex::decode(&t.header_bytes).map_err(|e| JobsError::Secondary(e.to_string()))?;
        let coinbase_tx = hex::decode(&t.coinbase_tx).map_err(|e| JobsError::Secondary(e.to_string()))?;
        let block_hash_bytes = hex::decode(&t.block_hash).map_err(|e| JobsError::Secondary(e.to_string()))?;
        let block_hash: [u8; 32] = block_hash_bytes
            .try_into()
            .map_err(|_| JobsError::Secondary("block_hash must be 32 bytes".to_string()))?;
        Ok(SecondaryTemplate {
            header_bytes,
            coinbase_tx,
            target_bits: t.target_bits,
            height: t.height,
            handle: t.handle,
            block_hash,
        })
    }

    async fn submit_solution(
        &self,
        version: u32,
        time: u32,
        nonce: u32,
        coinbase: &[u8],
    ) -> Result<(), JobsError> {
        self.rpc_call(
            "submitSolution",
            json!([version, time, nonce, hex::encode(coinbase)]),
        )
        .await?;
        Ok(())
    }

    async fn submit_aux_pow_solution(
        &self,
        version_with_aux_flag: u32,
        time: u32,
        coinbase: &[u8],
        aux_pow: &AuxPow,
    ) -> Result<(), JobsError> {
        self.rpc_call(
            "submitAuxPowSolution",
            json!([
                version_with_aux_flag,
                time,
                0,
                hex::encode(coinbase),
                {
                    "parent_header": hex::encode(&aux_pow.parent_header),
                    "parent_coinbase": hex::encode(&aux_pow.parent_coinbase),
                    "coinbase_merkle_branch": aux_pow
                        .coinbase_merkle_branch
                        .iter()
                        .map(hex::encode)
                        .collect::<Vec<_>>(),
                    "coinbase_merkle_index": aux_pow.coinbase_merkle_index,
                    "chain_id": aux_pow.chain_id,
                }
            ]),
        )
        .await?;
        Ok(())
    }
}
