//! PoT node
//!
//! Follows every configured chain: restores the local pool, seeds the peer
//! manager from the bootstrap list and runs one mining loop per chain.
//! Pool state is persisted to disk and survives restarts.

use anyhow::{Context, Result};
use clap::Parser;
use pot_node::{ChainContext, ChainManager, NodeConfig};
use pot_state::SledStateStore;
use pot_types::{Clock, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Proof-of-transaction node
#[derive(Parser, Debug)]
#[command(name = "pot-node")]
#[command(about = "Mempool and PoT consensus core for multi-chain community nodes", long_about = None)]
struct Args {
    /// JSON config file; defaults are used if omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory for persistent state (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error), overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Stop each chain after this many accepted blocks (0 = run until Ctrl+C)
    #[arg(long, default_value = "0")]
    rounds: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => NodeConfig::default(),
    };
    if let Some(data_dir) = args.data_dir.clone() {
        config.data_dir = data_dir;
    }
    if let Some(level) = args.log_level.clone() {
        config.log_level = level;
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    run(config, args.rounds).await
}

async fn run(config: NodeConfig, rounds: u64) -> Result<()> {
    let self_key = config.self_key()?;
    tracing::info!("Starting PoT node {}", self_key);
    tracing::info!("  Data directory: {:?}", config.data_dir);
    tracing::info!("  Chains: {}", config.chains.len());

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(SledStateStore::open(&config.data_dir)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let mut manager = ChainManager::new(self_key, store.clone(), clock.clone());
    let mut started = Vec::new();
    for chain_config in &config.chains {
        let bootstrap = chain_config.bootstrap_peers()?;
        let chain = manager.add_chain(chain_config)?;
        if chain.start(&bootstrap, clock.now_secs()) {
            started.push(chain);
        } else {
            tracing::warn!("Chain {} has no bootstrap peers, not mining it", chain.chain_id());
        }
    }
    let manager = Arc::new(manager);

    let mut handles: Vec<_> = started
        .into_iter()
        .map(|chain| {
            let manager = manager.clone();
            tokio::spawn(async move { mine(manager, chain, rounds).await })
        })
        .collect();

    tracing::info!("Node running with {} mining chains. Press Ctrl+C to stop.", handles.len());

    tokio::select! {
        _ = async {
            for handle in handles.iter_mut() {
                if let Err(e) = handle.await {
                    tracing::error!("Mining task failed: {}", e);
                }
            }
        } => {
            tracing::info!("All chains finished");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down...");
        }
    }

    for chain in manager.chains() {
        tracing::info!(
            "Chain {}: tip {:?}, {} txs pooled ({} local)",
            chain.chain_id(),
            chain.tip().map(|tip| tip.number),
            chain.pool().size(),
            chain.pool().local_size()
        );
    }

    if let Err(e) = store.flush() {
        tracing::error!("Failed to flush state: {}", e);
    }
    tracing::info!("Node stopped");

    Ok(())
}

/// Mine on one chain until `rounds` blocks are accepted, forever if 0
async fn mine(manager: Arc<ChainManager>, chain: Arc<ChainContext>, rounds: u64) {
    let chain_id = chain.chain_id().clone();
    let mut accepted = 0;

    while rounds == 0 || accepted < rounds {
        let Some(candidate) = chain.try_assemble() else {
            tracing::error!("Chain {} has no tip, stopping", chain_id);
            return;
        };

        let wait = candidate.header.timestamp.saturating_sub(manager.clock().now_secs());
        tokio::time::sleep(Duration::from_secs(wait)).await;

        if !chain.verify(&candidate, chain.power()) {
            tracing::error!("Own block {} on {} failed verification", candidate.header.number, chain_id);
            return;
        }

        manager.vote(&chain_id, &candidate.header);
        match manager.resolve_fork(&chain_id) {
            Some(winner) if winner.block_hash == candidate.header.hash => {
                chain.accept(&candidate);
                accepted += 1;
                tracing::info!(
                    "Chain {}: block {} ({}) with {} tx",
                    chain_id,
                    candidate.header.number,
                    candidate.header.hash,
                    usize::from(candidate.transaction.is_some())
                );
            }
            _ => {
                tracing::debug!("Chain {}: block {} lost the vote", chain_id, candidate.header.number);
                continue;
            }
        }

        if let Some(peer) = chain.peers().pop_up_optimal_block_peer() {
            tracing::debug!("Chain {}: announcing block {} to {}", chain_id, candidate.header.number, peer);
        }
    }
}
