//! Kaspa (kHeavyHash) adapter: the one REST GET-based daemon in the family
//! (§4.A, §6 "Kaspa uses a REST GET").

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pool_core::{AlgorithmId, CoinbaseData, Hash256, ParentChainConfig, ParentSnapshot};
use pool_crypto::{apply_merkle_branch, sha256d, PowBackend};
use serde::Deserialize;

use crate::bitcoin_family::build_merkle_branch;
use crate::{AdapterError, ParentAdapter};

pub struct KaspaAdapter {
    config: ParentChainConfig,
    pow_backend: Arc<dyn PowBackend>,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct BlockTemplateResponse {
    #[serde(rename = "daaScore")]
    daa_score: u64,
    #[serde(rename = "bits")]
    bits: String,
    #[serde(rename = "prevHash")]
    prev_hash: String,
    #[serde(rename = "coinbase")]
    coinbase_hex: String,
    #[serde(default)]
    #[serde(rename = "mergeSetHashes")]
    merge_set_hashes: Vec<String>,
}

impl KaspaAdapter {
    pub fn new(config: ParentChainConfig, pow_backend: Arc<dyn PowBackend>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        KaspaAdapter {
            config,
            pow_backend,
            http,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "http://{}:{}/block-template?pay_address={}",
            self.config.daemon_host, self.config.daemon_port, self.config.wallet_address
        )
    }
}

#[async_trait]
impl ParentAdapter for KaspaAdapter {
    fn algorithm(&self) -> AlgorithmId {
        AlgorithmId::KHeavyHash
    }

    async fn get_block_template(&self, reserve_size: usize) -> Result<ParentSnapshot, AdapterError> {
        let resp: BlockTemplateResponse = self.http.get(self.endpoint()).send().await?.json().await?;

        let bits = u32::from_str_radix(&resp.bits, 16)
            .map_err(|e| AdapterError::MalformedTemplate(e.to_string()))?;
        let target = pool_consensus::bits_to_target(bits);

        let mut coinbase_bytes = hex::decode(&resp.coinbase_hex)
            .map_err(|e| AdapterError::MalformedTemplate(e.to_string()))?;
        let reserve_offset = coinbase_bytes.len();
        coinbase_bytes.extend(std::iter::repeat_n(0u8, reserve_size));

        let coinbase_hash = sha256d(&coinbase_bytes);
        let mut leaves = vec![coinbase_hash];
        for h in &resp.merge_set_hashes {
            leaves.push(hex_to_hash(h)?);
        }
        let (branch, merkle_root) = build_merkle_branch(&leaves, 0);

        let coinbase_data = CoinbaseData {
            bytes: coinbase_bytes,
            merkle_branch: branch,
            coinbase_index: 0,
            merkle_root,
            reserve_offset,
            reserve_size,
        };
        coinbase_data.validate()?;

        let prev_hash = hex_to_hash(&resp.prev_hash)?;
        let mut header = Vec::with_capacity(72);
        header.extend_from_slice(&prev_hash);
        header.extend_from_slice(&merkle_root);
        header.extend_from_slice(&bits.to_le_bytes());
        header.extend_from_slice(&resp.daa_score.to_le_bytes());

        Ok(ParentSnapshot {
            hashing_blob: header.clone(),
            full_template: header,
            seed_hash: None,
            height: resp.daa_score,
            difficulty: pool_consensus::get_difficulty_for_bits(bits),
            target,
            coinbase_data,
        })
    }

    async fn inject_tag(
        &self,
        snapshot: &ParentSnapshot,
        merge_tag: &[u8],
    ) -> Result<ParentSnapshot, AdapterError> {
        let mut injected = snapshot.clone();
        let new_coinbase = snapshot.coinbase_data.with_reserve_overwritten(merge_tag)?;
        let new_hash = sha256d(&new_coinbase);
        let new_root = apply_merkle_branch(
            new_hash,
            &snapshot.coinbase_data.merkle_branch,
            snapshot.coinbase_data.coinbase_index,
            |a, b| {
                let mut buf = [0u8; 64];
                buf[..32].copy_from_slice(a);
                buf[32..].copy_from_slice(b);
                sha256d(&buf)
            },
        );
        injected.coinbase_data.bytes = new_coinbase;
        injected.coinbase_data.merkle_root = new_root;

        let mut header = snapshot.full_template.clone();
        if header.len() >= 64 {
            header[32..64].copy_from_slice(&new_root);
        }
        injected.hashing_blob = header.clone();
        injected.full_template = header;
        Ok(injected)
    }

    fn calculate_pow_hash(&self, hashing_blob: &[u8], seed_hash: Option<&Hash256>) -> Hash256 {
        self.pow_backend
            .pow_hash(AlgorithmId::KHeavyHash, hashing_blob, seed_hash)
            .unwrap_or([0xffu8; 32])
    }

    async fn submit_block(&self, full_template: &[u8]) -> Result<(), AdapterError> {
        let url = format!(
            "http://{}:{}/submit-block?block={}",
            self.config.daemon_host,
            self.config.daemon_port,
            hex::encode(full_template)
        );
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(AdapterError::DaemonError(format!("status {}", resp.status())));
        }
        Ok(())
    }
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

    #[test]
    fn endpoint_includes_pay_address() {
        let config = ParentChainConfig {
            name: "kaspa".into(),
            algorithm: AlgorithmId::KHeavyHash,
            daemon_host: "127.0.0.1".into(),
            daemon_port: 16110,
            daemon_user: None,
            daemon_password: None,
            wallet_address: "kaspa:pool".into(),
            chain_id: 4,
            enabled: true,
        };
        let adapter = KaspaAdapter::new(config, Arc::new(pool_crypto::StandardPowBackend));
        assert!(adapter.endpoint().contains("kaspa:pool"));
    }
}
