//! WATTx merged-mining pool server — entry point.
//!
//! Parses configuration, wires one Parent-Chain Adapter / Template Poller /
//! Job Builder per algorithm, starts the Scoring Engine and rewards
//! channel, and runs the Connection Manager until shutdown.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use log::{error, info};
use tokio::sync::Notify;

use pool_adapters::{build_adapter, TemplatePoller};
use pool_core::{AlgorithmId, ParentChainConfig, PoolConfig};
use pool_jobs::{JobBuilder, JobHandle};
use pool_rewards::{RewardsClient, RewardsConfig};
use pool_scoring::{ScoringConfig, ScoringEngine};
use pool_server::{AlgorithmContext, Server, ShareValidator};

mod secondary;

use secondary::SecondaryRpcClient;

#[derive(Parser)]
#[clap(name = "wattx-pool")]
#[clap(about = "WATTx merged-mining pool server")]
struct Cli {
    /// Path to a TOML config file. Overridden by POOL_* environment variables.
    #[clap(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Secondary chain node RPC endpoint.
    #[clap(long, default_value = "http://127.0.0.1:18081")]
    secondary_rpc: String,

    /// Rewards contract RPC endpoint.
    #[clap(long, default_value = "http://127.0.0.1:8545")]
    rewards_rpc: String,

    /// Rewards contract address.
    #[clap(long, default_value = "")]
    rewards_contract: String,

    /// Verbosity level (0-5).
    #[clap(short, long, default_value = "3")]
    verbosity: u8,
}

fn init_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();
}

/// Loads `PoolConfig` from an optional TOML file, then layers `POOL_*`
/// environment variable overrides on top (§6 "Configuration (enumerated)").
fn load_config(path: Option<&PathBuf>) -> Result<PoolConfig, config::ConfigError> {
    let mut builder = config::Config::builder().add_source(config::Config::try_from(&PoolConfig::default())?);
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path.as_path()));
    }
    builder = builder.add_source(config::Environment::with_prefix("POOL").separator("__"));
    builder.build()?.try_deserialize()
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbosity);
    info!("starting wattx-pool");

    let config = match load_config(cli.config.as_ref()) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    runtime.block_on(async move {
        if let Err(e) = run(config, cli).await {
            error!("fatal error: {e}");
            std::process::exit(1);
        }
    });
}

async fn run(config: PoolConfig, cli: Cli) -> std::io::Result<()> {
    let pow_backend: Arc<dyn pool_crypto::PowBackend> = Arc::new(pool_crypto::StandardPowBackend);
    let secondary: Arc<dyn pool_jobs::SecondaryMining> =
        Arc::new(SecondaryRpcClient::new(cli.secondary_rpc.clone()));

    // Configured algorithm ordering, first-seen among enabled parents,
    // drives each algorithm's listen port (§6 "base_port + index_in_configured_order").
    let mut configured_order: Vec<AlgorithmId> = Vec::new();
    for parent in config.parents.iter().filter(|p| p.enabled) {
        if !configured_order.contains(&parent.algorithm) {
            configured_order.push(parent.algorithm);
        }
    }

    let running = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let scoring = Arc::new(Mutex::new(ScoringEngine::new(ScoringConfig {
        max_nethash_percent_per_chain: config.max_nethash_percent_per_chain,
        min_luck_multiplier: config.min_luck_multiplier,
        max_luck_multiplier: config.max_luck_multiplier,
    })));

    let rewards = Arc::new(RewardsClient::new(RewardsConfig {
        rpc_url: cli.rewards_rpc,
        contract_address: cli.rewards_contract,
        from_address: config.pool_secondary_address.clone(),
        batch_interval: Duration::from_secs(30),
        batch_size: 100,
    }));

    let mut background_tasks = Vec::new();
    let mut contexts: HashMap<AlgorithmId, AlgorithmContext> = HashMap::new();

    for &algorithm in &configured_order {
        // §4.C step 1: the primary parent is the first configured chain for this algorithm.
        let primary: ParentChainConfig = config
            .parents
            .iter()
            .find(|p| p.enabled && p.algorithm == algorithm)
            .cloned()
            .expect("algorithm present in configured_order has at least one enabled parent");
        let chain_name = primary.name.clone();

        let adapter: Arc<dyn pool_adapters::ParentAdapter> =
            Arc::from(build_adapter(primary, pow_backend.clone()));

        let job_wake = Arc::new(Notify::new());
        let (poller, snapshot_rx) = TemplatePoller::new(adapter.clone(), job_wake.clone());
        background_tasks.push(tokio::spawn(poller.run(running.clone())));

        let (job_builder, job_rx) = JobBuilder::new(
            algorithm,
            adapter.clone(),
            snapshot_rx,
            secondary.clone(),
            config.secondary_chain_id,
            Duration::from_secs(config.job_timeout_seconds),
        );
        let table = job_builder.table();
        let running_jb = running.clone();
        background_tasks.push(tokio::spawn(job_builder.run(job_wake, running_jb)));

        let max_secondary_target = pool_consensus::max_target(algorithm);
        let validator = Arc::new(ShareValidator {
            adapter: adapter.clone(),
            secondary: secondary.clone(),
            scoring: scoring.clone(),
            rewards: rewards.clone(),
            chain_name,
            secondary_chain_id: config.secondary_chain_id,
            max_secondary_target,
        });

        let index = algorithm
            .index_in(&configured_order)
            .expect("algorithm is a member of configured_order by construction");
        contexts.insert(
            algorithm,
            AlgorithmContext {
                algorithm,
                listen_port: config.base_port + index as u16,
                adapter,
                job_handle: JobHandle {
                    current: job_rx,
                    table,
                },
                validator,
            },
        );
    }

    let adapter_map: HashMap<AlgorithmId, Arc<dyn pool_adapters::ParentAdapter>> =
        contexts.iter().map(|(a, c)| (*a, c.adapter.clone())).collect();

    let server = Arc::new(Server::new(config.clone(), contexts));

    background_tasks.push(tokio::spawn(scoring_loop(
        config,
        adapter_map,
        scoring.clone(),
        server.stats_handle(),
        running.clone(),
    )));
    background_tasks.push(tokio::spawn(rewards.clone().run(running.clone())));

    shutdown_on_ctrl_c(server.running_flag());
    server.run().await?;

    for task in background_tasks {
        task.abort();
    }
    Ok(())
}

/// Scoring Engine background task (§4.G): three passes every
/// `hashrate_update_interval_seconds`.
async fn scoring_loop(
    config: PoolConfig,
    adapters: HashMap<AlgorithmId, Arc<dyn pool_adapters::ParentAdapter>>,
    scoring: Arc<Mutex<ScoringEngine>>,
    stats: Arc<Mutex<pool_core::PoolStats>>,
    running: Arc<std::sync::atomic::AtomicBool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(config.hashrate_update_interval_seconds.max(1)));
    while running.load(Ordering::Relaxed) {
        interval.tick().await;
        let now = pool_util::now_secs();
        for parent in config.parents.iter().filter(|p| p.enabled) {
            let Some(adapter) = adapters.get(&parent.algorithm) else {
                continue;
            };
            let accepted = stats
                .lock()
                .unwrap()
                .shares_accepted
                .get(&parent.algorithm)
                .copied()
                .unwrap_or(0);
            // Pass 1 needs the chain's current difficulty; reuse the adapter's
            // latest template rather than issuing a dedicated RPC per tick.
            if let Ok(snapshot) = adapter.get_block_template(0).await {
                let mut engine = scoring.lock().unwrap();
                engine.update_chain_stats(&parent.name, snapshot.difficulty, accepted, config.share_difficulty, now);
            }
        }
        let mut engine = scoring.lock().unwrap();
        engine.rebuild_miner_hashrates(config.share_difficulty);
        engine.recompute_scores();
    }
}

fn shutdown_on_ctrl_c(running: Arc<std::sync::atomic::AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running.store(false, Ordering::Relaxed);
        }
    });
}
