//! Adapter for the `getblocktemplate`-style Bitcoin-family daemons
//! (sha256d, scrypt, x11, equihash) — §4.A.
//!
//! Templates are fetched over HTTP JSON-RPC 2.0 with optional Basic auth;
//! the coinbase's BIP34 height push is followed immediately by a reserve
//! region the pool is free to overwrite with a merge-mining tag.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pool_core::{AlgorithmId, CoinbaseData, Hash256, ParentChainConfig, ParentSnapshot};
use pool_crypto::{apply_merkle_branch, sha256d, PowBackend};
use serde::Deserialize;
use serde_json::json;

use crate::{AdapterError, ParentAdapter};

pub struct BitcoinFamilyAdapter {
    config: ParentChainConfig,
    pow_backend: Arc<dyn PowBackend>,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GetBlockTemplateResult {
    height: u64,
    bits: String,
    previousblockhash: String,
    curtime: u64,
    coinbasevalue: u64,
    #[serde(default)]
    transactions: Vec<TemplateTransaction>,
}

#[derive(Debug, Deserialize)]
struct TemplateTransaction {
    #[allow(dead_code)]
    data: String,
    hash: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<serde_json::Value>,
}

impl BitcoinFamilyAdapter {
    pub fn new(config: ParentChainConfig, pow_backend: Arc<dyn PowBackend>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        BitcoinFamilyAdapter {
            config,
            pow_backend,
            http,
        }
    }

    fn endpoint(&self) -> String {
        format!("http://{}:{}/", self.config.daemon_host, self.config.daemon_port)
    }

    async fn rpc_call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, AdapterError> {
        let mut req = self.http.post(self.endpoint()).json(&json!({
            "jsonrpc": "2.0",
            "id": "pool",
            "method": method,
            "params": params,
        }));
        if let Some(user) = &self.config.daemon_user {
            req = req.basic_auth(user, self.config.daemon_password.as_ref());
        }
        let resp: RpcResponse<serde_json::Value> = req.send().await?.json().await?;
        if let Some(err) = resp.error {
            return Err(AdapterError::DaemonError(err.to_string()));
        }
        resp.result
            .ok_or_else(|| AdapterError::DaemonError("empty result".to_string()))
    }

    /// BIP34-minimal height push followed by a zero-filled reserve region.
    fn build_script_sig(height: u64, reserve_size: usize) -> Vec<u8> {
        let height_bytes = minimal_height_bytes(height);
        let mut script = Vec::with_capacity(1 + height_bytes.len() + reserve_size);
        script.push(height_bytes.len() as u8);
        script.extend_from_slice(&height_bytes);
        script.extend(std::iter::repeat_n(0u8, reserve_size));
        script
    }

    fn build_coinbase(
        &self,
        height: u64,
        value: u64,
        reserve_size: usize,
    ) -> (Vec<u8>, usize) {
        let script_sig = Self::build_script_sig(height, reserve_size);
        let reserve_offset_in_script = 1 + minimal_height_bytes(height).len();

        let mut tx = Vec::new();
        tx.extend_from_slice(&1u32.to_le_bytes()); // version
        tx.push(0x01); // vin count
        tx.extend_from_slice(&[0u8; 32]); // null prevout hash
        tx.extend_from_slice(&0xffff_ffffu32.to_le_bytes()); // null prevout index
        push_compact_size(&mut tx, script_sig.len() as u64);
        let script_sig_offset = tx.len();
        tx.extend_from_slice(&script_sig);
        tx.extend_from_slice(&0xffff_ffffu32.to_le_bytes()); // sequence
        tx.push(0x01); // vout count
        tx.extend_from_slice(&value.to_le_bytes());
        let wallet_script = wallet_placeholder_script(&self.config.wallet_address);
        push_compact_size(&mut tx, wallet_script.len() as u64);
        tx.extend_from_slice(&wallet_script);
        tx.extend_from_slice(&0u32.to_le_bytes()); // locktime

        (tx, script_sig_offset + reserve_offset_in_script)
    }
}

#[async_trait]
impl ParentAdapter for BitcoinFamilyAdapter {
    fn algorithm(&self) -> AlgorithmId {
        self.config.algorithm
    }

    async fn get_block_template(&self, reserve_size: usize) -> Result<ParentSnapshot, AdapterError> {
        let raw = self
            .rpc_call("getblocktemplate", json!([{"rules": ["segwit"]}]))
            .await?;
        let template: GetBlockTemplateResult = serde_json::from_value(raw)
            .map_err(|e| AdapterError::MalformedTemplate(e.to_string()))?;

        let bits = u32::from_str_radix(&template.bits, 16)
            .map_err(|e| AdapterError::MalformedTemplate(e.to_string()))?;
        let target = pool_consensus::bits_to_target(bits);

        let (coinbase_bytes, reserve_offset) =
            self.build_coinbase(template.height, template.coinbasevalue, reserve_size);
        let coinbase_hash = sha256d(&coinbase_bytes);

        let mut leaves = vec![coinbase_hash];
        for tx in &template.transactions {
            let mut hash = hex_to_hash(&tx.hash)
                .map_err(|e| AdapterError::MalformedTemplate(e.to_string()))?;
            hash.reverse(); // tx hashes in getblocktemplate are displayed big-endian
            leaves.push(hash);
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

        let prev_hash =
            hex_to_hash(&template.previousblockhash).map_err(|e| AdapterError::MalformedTemplate(e.to_string()))?;

        let header = build_header(bits, template.curtime, &prev_hash, &merkle_root);

        Ok(ParentSnapshot {
            hashing_blob: header.clone(),
            full_template: header,
            seed_hash: None,
            height: template.height,
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
        let new_coinbase_hash = sha256d(&new_coinbase);
        let new_root = apply_merkle_branch(
            new_coinbase_hash,
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
        patch_merkle_root(&mut header, &new_root);
        injected.hashing_blob = header.clone();
        injected.full_template = header;
        Ok(injected)
    }

    fn calculate_pow_hash(&self, hashing_blob: &[u8], seed_hash: Option<&Hash256>) -> Hash256 {
        self.pow_backend
            .pow_hash(self.algorithm(), hashing_blob, seed_hash)
            .unwrap_or([0xffu8; 32])
    }

    async fn submit_block(&self, full_template: &[u8]) -> Result<(), AdapterError> {
        self.rpc_call("submitblock", json!([hex::encode(full_template)]))
            .await?;
        Ok(())
    }
}

fn minimal_height_bytes(height: u64) -> Vec<u8> {
    if height == 0 {
        return vec![0];
    }
    let mut bytes = height.to_le_bytes().to_vec();
    while bytes.last() == Some(&0) && bytes.len() > 1 {
        bytes.pop();
    }
    if bytes.last().map(|b| b & 0x80 != 0).unwrap_or(false) {
        bytes.push(0);
    }
    bytes
}

fn push_compact_size(buf: &mut Vec<u8>, value: u64) {
    if value < 0xfd {
        buf.push(value as u8);
    } else if value <= 0xffff {
        buf.push(0xfd);
        buf.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xffff_ffff {
        buf.push(0xfe);
        buf.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        buf.push(0xff);
        buf.extend_from_slice(&value.to_le_bytes());
    }
}

/// Deterministic stand-in scriptPubKey for a pool wallet address: a
/// `OP_RETURN`-free placeholder script tagged with the address bytes, since
/// this workspace does not vendor a Base58Check/Bech32 address decoder.
fn wallet_placeholder_script(address: &str) -> Vec<u8> {
    let mut script = vec![0x76, 0xa9, 0x14]; // OP_DUP OP_HASH160 <20 bytes>
    let digest = sha256d(address.as_bytes());
    script.extend_from_slice(&digest[0..20]);
    script.extend_from_slice(&[0x88, 0xac]); // OP_EQUALVERIFY OP_CHECKSIG
    script
}

fn hex_to_hash(s: &str) -> Result<Hash256, String> {
    let bytes = hex::decode(s).map_err(|e| e.to_string())?;
    bytes
        .try_into()
        .map_err(|_| "expected 32-byte hash".to_string())
}

/// Computes the merkle branch required to recompute the root from `leaves[index]`
/// and the pairwise double-SHA-256 root itself (standard Bitcoin algorithm,
/// duplicating the last node at levels with odd width).
pub fn build_merkle_branch(leaves: &[Hash256], index: usize) -> (Vec<Hash256>, Hash256) {
    let mut branch = Vec::new();
    let mut level = leaves.to_vec();
    let mut idx = index;
    while level.len() > 1 {
        let sibling = if idx % 2 == 1 {
            level[idx - 1]
        } else if idx + 1 < level.len() {
            level[idx + 1]
        } else {
            level[idx]
        };
        branch.push(sibling);

        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        let mut i = 0;
        while i < level.len() {
            let left = level[i];
            let right = if i + 1 < level.len() { level[i + 1] } else { level[i] };
            let mut buf = [0u8; 64];
            buf[..32].copy_from_slice(&left);
            buf[32..].copy_from_slice(&right);
            next.push(sha256d(&buf));
            i += 2;
        }
        idx /= 2;
        level = next;
    }
    (branch, level[0])
}

/// Builds an 80-byte Bitcoin-style header: version | prev_hash | merkle_root
/// | time | bits | nonce(zeroed, filled in by the miner).
fn build_header(bits: u32, time: u64, prev_hash: &Hash256, merkle_root: &Hash256) -> Vec<u8> {
    let mut header = Vec::with_capacity(80);
    header.extend_from_slice(&1u32.to_le_bytes());
    header.extend_from_slice(prev_hash);
    header.extend_from_slice(merkle_root);
    header.extend_from_slice(&(time as u32).to_le_bytes());
    header.extend_from_slice(&bits.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    header
}

fn patch_merkle_root(header: &mut [u8], root: &Hash256) {
    if header.len() >= 68 {
        header[36..68].copy_from_slice(root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ParentChainConfig {
        ParentChainConfig {
            name: "bitcoin".into(),
            algorithm: AlgorithmId::Sha256d,
            daemon_host: "127.0.0.1".into(),
            daemon_port: 8332,
            daemon_user: None,
            daemon_password: None,
            wallet_address: "bc1qpool".into(),
            chain_id: 1,
            enabled: true,
        }
    }

    #[test]
    fn build_script_sig_places_reserve_after_height_push() {
        let script = BitcoinFamilyAdapter::build_script_sig(700_000, 8);
        let height_len = minimal_height_bytes(700_000).len();
        assert_eq!(script[0] as usize, height_len);
        assert_eq!(script.len(), 1 + height_len + 8);
    }

    #[test]
    fn merkle_branch_single_leaf_has_empty_branch() {
        let leaf = [7u8; 32];
        let (branch, root) = build_merkle_branch(&[leaf], 0);
        assert!(branch.is_empty());
        assert_eq!(root, leaf);
    }

    #[test]
    fn coinbase_reserve_region_is_overwritable_without_resizing() {
        let adapter = BitcoinFamilyAdapter::new(sample_config(), Arc::new(pool_crypto::StandardPowBackend));
        let (coinbase, offset) = adapter.build_coinbase(700_000, 5_000_000_000, 16);
        let len_before = coinbase.len();
        let cb = CoinbaseData {
            bytes: coinbase,
            merkle_branch: vec![],
            coinbase_index: 0,
            merkle_root: [0u8; 32],
            reserve_offset: offset,
            reserve_size: 16,
        };
        let tag = vec![0xAB; 16];
        let out = cb.with_reserve_overwritten(&tag).unwrap();
        assert_eq!(out.len(), len_before);
        assert_eq!(&out[offset..offset + 16], tag.as_slice());
    }
}
