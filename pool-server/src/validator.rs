//! Share Validator (§4.F): the ten-step pipeline a `mining.submit`/`submit`
//! call runs through between "bytes off the wire" and "accepted or
//! rejected", plus the side effects (parent submission, AuxPoW submission,
//! rewards-channel queueing) a valid share triggers.

use std::sync::{Arc, Mutex};

use pool_adapters::ParentAdapter;
use pool_core::{BlockFound, Job, RewardsSink, ShareSubmission};
use pool_jobs::SecondaryMining;
use pool_scoring::ScoringEngine;

use crate::message::RpcError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareOutcome {
    Accepted,
    Rejected,
}

/// Everything the Share Validator needs for one algorithm, bundled so
/// `lib.rs`'s dispatch table can hand it off without threading five
/// separate arguments through every call site.
pub struct ShareValidator {
    pub adapter: Arc<dyn ParentAdapter>,
    pub secondary: Arc<dyn SecondaryMining>,
    pub scoring: Arc<Mutex<ScoringEngine>>,
    pub rewards: Arc<dyn RewardsSink>,
    pub chain_name: String,
    pub secondary_chain_id: u32,
    pub max_secondary_target: pool_core::Hash256,
}

impl ShareValidator {
    /// Runs §4.F steps 1-10 for one submitted share. `secondary_address` and
    /// `chain` (the session's bound parent chain name) come from the caller
    /// since they live on `Session`, not on the validator itself.
    pub async fn validate(
        &self,
        job: &Job,
        secondary_address: &str,
        share_difficulty: f64,
        nonce_hex: &str,
        result_hex: &str,
    ) -> Result<ShareOutcome, RpcError> {
        // Steps 2-3: parse the submitted value as a 32-byte big-endian integer.
        let submitted = parse_result(result_hex).ok_or_else(RpcError::invalid_share)?;

        // Step 4: compare against the share target; reject outright if missed.
        let share_target = pool_consensus::difficulty_to_target(job.algorithm, share_difficulty);
        if !target_met(&submitted, &share_target) {
            return Err(RpcError::invalid_share());
        }

        // Step 5.
        let meets_parent = target_met(&submitted, &job.parent_target());

        // Step 6.
        let adjusted_secondary_target = {
            let scoring = self.scoring.lock().unwrap();
            scoring.adjusted_secondary_target(
                job.secondary_target,
                secondary_address,
                self.max_secondary_target,
            )
        };
        let meets_secondary = target_met(&submitted, &adjusted_secondary_target);

        // Step 7.
        let capped = {
            let scoring = self.scoring.lock().unwrap();
            scoring.is_miner_capped_on_chain(secondary_address, &self.chain_name)
        };

        let mut parent_accepted = false;
        if meets_parent {
            parent_accepted = true;
            if !capped {
                self.scoring
                    .lock()
                    .unwrap()
                    .record_miner_share(secondary_address, &self.chain_name);
            }
            let _ = self.adapter.submit_block(&job.parent_snapshot.full_template).await;
        }

        let mut secondary_accepted = false;
        if meets_secondary {
            if let Some(nonce) = parse_nonce(nonce_hex) {
                let aux_pow = self.adapter.create_aux_pow(
                    &job.secondary_template.header_bytes,
                    &job.parent_snapshot,
                    nonce,
                    &job.merge_mining_tag,
                );
                if self.self_verify(&aux_pow, &job.secondary_template.block_hash) {
                    let res = self
                        .secondary
                        .submit_aux_pow_solution(
                            pool_jobs::AUX_POW_FLAG,
                            pool_util::now_secs() as u32,
                            &job.secondary_template.coinbase_tx,
                            &aux_pow,
                        )
                        .await;
                    secondary_accepted = res.is_ok();
                }
            }
        }

        if parent_accepted || secondary_accepted {
            self.rewards.submit_share(ShareSubmission {
                secondary_address: secondary_address.to_string(),
                shares: 1,
                parent_valid: parent_accepted,
                secondary_valid: secondary_accepted,
                parent_height: job.parent_snapshot.height,
                secondary_height: job.secondary_template.height,
                timestamp: pool_util::now_secs(),
            });
            if parent_accepted || secondary_accepted {
                self.rewards.submit_block(BlockFound {
                    secondary_address: secondary_address.to_string(),
                    chain: self.chain_name.clone(),
                    height: job.parent_snapshot.height,
                    timestamp: pool_util::now_secs(),
                });
            }
        }

        if parent_accepted || secondary_accepted {
            Ok(ShareOutcome::Accepted)
        } else {
            Err(RpcError::invalid_share())
        }
    }

    /// Step 9c: the proof must be chain-salted for this exact secondary
    /// chain, and the merge-mining tag carried in the parent coinbase must
    /// commit to `secondary_block_hash` under that chain id — i.e. the
    /// 32 bytes immediately following the tag's magic must equal
    /// `commit_of(secondary_block_hash, secondary_chain_id)` (§8 Invariant 3).
    fn self_verify(&self, aux_pow: &pool_adapters::AuxPow, secondary_block_hash: &pool_core::Hash256) -> bool {
        if aux_pow.chain_id != self.secondary_chain_id {
            return false;
        }
        let Some(tag_root) = find_merge_mining_tag_root(&aux_pow.parent_coinbase) else {
            return false;
        };
        let expected = pool_jobs::commit_of(secondary_block_hash, self.secondary_chain_id);
        tag_root == expected
    }
}

/// Locates `MM_MAGIC` inside a coinbase byte string and returns the 32-byte
/// commitment root directly following it (`pool_jobs::commitment::build_merge_mining_tag`'s
/// layout: magic, root, merkle-size, index, chain id).
fn find_merge_mining_tag_root(parent_coinbase: &[u8]) -> Option<pool_core::Hash256> {
    const MM_MAGIC: [u8; 4] = [0xfa, 0xbe, 0x6d, 0x6d];
    let pos = parent_coinbase
        .windows(MM_MAGIC.len())
        .position(|w| w == MM_MAGIC)?;
    let root_start = pos + MM_MAGIC.len();
    let root_bytes = parent_coinbase.get(root_start..root_start + 32)?;
    root_bytes.try_into().ok()
}

fn parse_result(result_hex: &str) -> Option<pool_core::Hash256> {
    let bytes = pool_util::hex_to_bytes(result_hex).ok()?;
    let arr: [u8; 32] = bytes.try_into().ok()?;
    Some(arr)
}

fn parse_nonce(nonce_hex: &str) -> Option<u32> {
    let bytes = pool_util::hex_to_bytes(nonce_hex).ok()?;
    let arr: [u8; 4] = bytes.try_into().ok()?;
    Some(u32::from_le_bytes(arr))
}

fn target_met(submitted: &pool_core::Hash256, target: &pool_core::Hash256) -> bool {
    let submitted = pool_consensus::u256_from_be_bytes(submitted);
    let target = pool_consensus::u256_from_be_bytes(target);
    submitted <= target
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_met_respects_ordering() {
        let low = [0u8; 32];
        let mut high = [0u8; 32];
        high[31] = 1;
        assert!(target_met(&low, &high));
        assert!(!target_met(&high, &low));
        assert!(target_met(&low, &low));
    }

    #[test]
    fn parse_result_rejects_wrong_length() {
        assert!(parse_result("abcd").is_none());
        assert!(parse_result(&"00".repeat(32)).is_some());
    }

    #[test]
    fn parse_nonce_is_little_endian() {
        assert_eq!(parse_nonce("01000000"), Some(1));
        assert_eq!(parse_nonce("ffffffff"), Some(u32::MAX));
    }

    #[test]
    fn finds_tag_root_after_magic_regardless_of_surrounding_bytes() {
        let root = [9u8; 32];
        let tag = pool_jobs::build_merge_mining_tag(&root, 0x1234);
        let mut coinbase = vec![1, 2, 3];
        coinbase.extend_from_slice(&tag);
        coinbase.extend_from_slice(&[4, 5, 6]);
        assert_eq!(find_merge_mining_tag_root(&coinbase), Some(root));
    }

    #[test]
    fn missing_tag_yields_no_root() {
        assert_eq!(find_merge_mining_tag_root(b"no tag here"), None);
    }

    #[test]
    fn self_verify_rejects_wrong_chain_id_and_wrong_commitment() {
        let block_hash = [3u8; 32];
        let chain_id = 7u32;
        let root = pool_jobs::commit_of(&block_hash, chain_id);
        let tag = pool_jobs::build_merge_mining_tag(&root, chain_id);

        let validator = ShareValidator {
            adapter: Arc::new(NullAdapter),
            secondary: Arc::new(NullSecondary),
            scoring: Arc::new(Mutex::new(ScoringEngine::new(Default::default()))),
            rewards: Arc::new(NullRewards),
            chain_name: "test".to_string(),
            secondary_chain_id: chain_id,
            max_secondary_target: [0xffu8; 32],
        };

        let matching = pool_adapters::AuxPow {
            parent_header: Vec::new(),
            parent_coinbase: tag.clone(),
            coinbase_merkle_branch: Vec::new(),
            coinbase_merkle_index: 0,
            chain_id,
        };
        assert!(validator.self_verify(&matching, &block_hash));

        let wrong_chain = pool_adapters::AuxPow { chain_id: chain_id + 1, ..matching.clone() };
        assert!(!validator.self_verify(&wrong_chain, &block_hash));

        let wrong_hash = [4u8; 32];
        assert!(!validator.self_verify(&matching, &wrong_hash));
    }

    struct NullAdapter;
    #[async_trait::async_trait]
    impl ParentAdapter for NullAdapter {
        fn algorithm(&self) -> pool_core::AlgorithmId {
            pool_core::AlgorithmId::Sha256d
        }
        async fn get_block_template(&self, _reserve_size: usize) -> Result<pool_core::ParentSnapshot, pool_adapters::AdapterError> {
            unimplemented!()
        }
        async fn inject_tag(
            &self,
            _snapshot: &pool_core::ParentSnapshot,
            _merge_tag: &[u8],
        ) -> Result<pool_core::ParentSnapshot, pool_adapters::AdapterError> {
            unimplemented!()
        }
        fn calculate_pow_hash(&self, _hashing_blob: &[u8], _seed_hash: Option<&pool_core::Hash256>) -> pool_core::Hash256 {
            unimplemented!()
        }
        async fn submit_block(&self, _full_template: &[u8]) -> Result<(), pool_adapters::AdapterError> {
            unimplemented!()
        }
    }

    struct NullSecondary;
    #[async_trait::async_trait]
    impl SecondaryMining for NullSecondary {
        async fn get_block_template(&self) -> Result<pool_core::SecondaryTemplate, pool_jobs::JobsError> {
            unimplemented!()
        }
        async fn submit_solution(&self, _version: u32, _time: u32, _nonce: u32, _coinbase: &[u8]) -> Result<(), pool_jobs::JobsError> {
            unimplemented!()
        }
        async fn submit_aux_pow_solution(
            &self,
            _version_with_aux_flag: u32,
            _time: u32,
            _coinbase: &[u8],
            _aux_pow: &pool_adapters::AuxPow,
        ) -> Result<(), pool_jobs::JobsError> {
            unimplemented!()
        }
    }

    struct NullRewards;
    impl RewardsSink for NullRewards {
        fn submit_share(&self, _event: ShareSubmission) {}
        fn submit_block(&self, _event: BlockFound) {}
    }
}
