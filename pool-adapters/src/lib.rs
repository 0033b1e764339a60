//! Parent-chain adapters (§4.A): one implementation per algorithm family,
//! behind a common capability trait. Adapters are the only components
//! allowed to speak a parent daemon's wire protocol.

use std::sync::Arc;

use async_trait::async_trait;
use pool_core::{AlgorithmId, Hash256, ParentChainConfig, ParentSnapshot};
use pool_crypto::PowBackend;
use thiserror::Error;

pub mod bitcoin_family;
pub mod ethash;
pub mod kaspa;
pub mod monero;
pub mod poller;

pub use bitcoin_family::BitcoinFamilyAdapter;
pub use ethash::EthashAdapter;
pub use kaspa::KaspaAdapter;
pub use monero::MoneroAdapter;
pub use poller::TemplatePoller;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("daemon request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("daemon returned an error response: {0}")]
    DaemonError(String),
    #[error("malformed template: {0}")]
    MalformedTemplate(String),
    #[error("core invariant violated: {0}")]
    Core(#[from] pool_core::CoreError),
}

/// A compact proof that a parent-chain block's work covers a secondary-chain
/// block (§3 Glossary, §4.A `create_aux_pow`).
#[derive(Debug, Clone)]
pub struct AuxPow {
    pub parent_header: Vec<u8>,
    pub parent_coinbase: Vec<u8>,
    pub coinbase_merkle_branch: Vec<Hash256>,
    pub coinbase_merkle_index: u32,
    pub chain_id: u32,
}

/// The capability set every parent-chain adapter exposes (§4.A).
#[async_trait]
pub trait ParentAdapter: Send + Sync {
    fn algorithm(&self) -> AlgorithmId;

    async fn get_block_template(&self, reserve_size: usize) -> Result<ParentSnapshot, AdapterError>;

    /// Injects `merge_tag` into the coinbase reserve region, recomputes the
    /// merkle root, and returns an updated snapshot whose `hashing_blob`,
    /// `coinbase_data`, and `full_template` reflect the injected tag.
    async fn inject_tag(
        &self,
        snapshot: &ParentSnapshot,
        merge_tag: &[u8],
    ) -> Result<ParentSnapshot, AdapterError>;

    fn calculate_pow_hash(&self, hashing_blob: &[u8], seed_hash: Option<&Hash256>) -> Hash256;

    fn difficulty_to_target(&self, difficulty: f64) -> Hash256 {
        pool_consensus::difficulty_to_target(self.algorithm(), difficulty)
    }

    async fn submit_block(&self, full_template: &[u8]) -> Result<(), AdapterError>;

    fn create_aux_pow(
        &self,
        secondary_header: &[u8],
        snapshot: &ParentSnapshot,
        nonce: u32,
        merge_tag: &[u8],
    ) -> AuxPow {
        let _ = (secondary_header, nonce);
        AuxPow {
            parent_header: snapshot.full_template.clone(),
            parent_coinbase: snapshot.coinbase_data.bytes.clone(),
            coinbase_merkle_branch: snapshot.coinbase_data.merkle_branch.clone(),
            coinbase_merkle_index: snapshot.coinbase_data.coinbase_index,
            chain_id: merge_tag_chain_id(merge_tag),
        }
    }
}

/// `merge_mining_tag` carries the chain id as its trailing 4 bytes (§4.C);
/// pull it back out for the AuxPow record.
fn merge_tag_chain_id(merge_tag: &[u8]) -> u32 {
    if merge_tag.len() < 4 {
        return 0;
    }
    let start = merge_tag.len() - 4;
    u32::from_be_bytes(merge_tag[start..].try_into().unwrap())
}

/// Instantiates the adapter matching `config.algorithm` (§9: "a factory
/// function returns an owned handle behind this interface").
pub fn build_adapter(
    config: ParentChainConfig,
    pow_backend: Arc<dyn PowBackend>,
) -> Box<dyn ParentAdapter> {
    match config.algorithm {
        AlgorithmId::Sha256d
        | AlgorithmId::Scrypt
        | AlgorithmId::X11
        | AlgorithmId::Equihash => Box::new(BitcoinFamilyAdapter::new(config, pow_backend)),
        AlgorithmId::RandomX => Box::new(MoneroAdapter::new(config, pow_backend)),
        AlgorithmId::Ethash => Box::new(EthashAdapter::new(config, pow_backend)),
        AlgorithmId::KHeavyHash => Box::new(KaspaAdapter::new(config, pow_backend)),
    }
}
