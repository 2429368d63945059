//! Ember miner: drives the proof-of-work engine against a local in-memory chain.
//!
//! Mines a fixed number of blocks on a simulated clock, then re-verifies
//! the whole chain through the batch verifier and reports the hashrate.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ember_consensus::{Engine, PowEngine, ProofOfWork};
use ember_core::chain::{MemoryChain, MemoryState};
use ember_core::crypto::KeyPair;
use ember_core::traits::ChainView;
use ember_core::types::Header;

use crate::config::MinerConfig;

/// CLI arguments for the miner.
#[derive(Debug, Parser)]
#[command(name = "ember-miner")]
#[command(about = "Ember local proof-of-work miner", long_about = None)]
struct Args {
    /// Settings file (TOML, YAML or JSON).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of blocks to mine. Overrides the settings file.
    #[arg(long)]
    blocks: Option<u64>,

    /// Sealing threads. 0 uses every core.
    #[arg(long)]
    threads: Option<usize>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let mut settings = MinerConfig::load(args.config.as_deref()).context("failed to load miner settings")?;
    if let Some(blocks) = args.blocks {
        settings.blocks = blocks;
    }
    if let Some(threads) = args.threads {
        settings.engine.threads = threads;
    }

    info!("ember-miner v{}", env!("CARGO_PKG_VERSION"));
    info!(
        chain_id = settings.chain.chain_id,
        engine = settings.chain.consensus.name(),
        blocks = settings.blocks,
        threads = settings.engine.seal_threads(),
        "starting"
    );

    let chain_config = Arc::new(settings.chain.clone());
    let Some(params) = chain_config.pow() else {
        bail!("ember-miner only drives proof-of-work chains, got {}", chain_config.consensus.name());
    };
    let interval = settings.block_interval_secs.unwrap_or(params.target_block_interval_secs).max(1);

    let now = Arc::new(AtomicU64::new(chain_config.genesis_timestamp));
    let clock = Arc::clone(&now);
    let engine = ProofOfWork::new(Arc::clone(&chain_config), settings.engine.clone())
        .context("failed to create proof-of-work engine")?
        .with_clock(move || clock.load(Ordering::SeqCst));
    let chain = Arc::new(MemoryChain::new(Arc::clone(&chain_config)));
    let coinbase = KeyPair::generate().address();
    let mut state = MemoryState::new();

    let stop = CancellationToken::new();
    let on_signal = stop.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        warn!("received SIGINT, shutting down");
        on_signal.cancel();
    });

    let started = Instant::now();
    let mut mined = 0u64;
    while mined < settings.blocks && !stop.is_cancelled() {
        let parent = chain.current_header().context("chain has no head")?;
        let timestamp = now.fetch_add(interval, Ordering::SeqCst) + interval;
        let mut header = Header {
            parent_hash: parent.hash(),
            number: parent.number + 1,
            timestamp,
            gas_limit: parent.gas_limit,
            coinbase,
            extra_data: b"ember-miner".to_vec(),
            ..Header::default()
        };
        engine.prepare(&*chain, &mut header).context("prepare failed")?;
        let block = engine
            .finalize_and_assemble(&*chain, header, &mut state, Vec::new(), Vec::new(), &[])
            .context("assembly failed")?;

        let (results, mut sealed) = mpsc::unbounded_channel();
        engine.seal(&*chain, block, results, stop.child_token()).context("seal rejected")?;
        let Some(block) = sealed.recv().await else {
            warn!(number = parent.number + 1, "sealing stopped before a seal was found");
            break;
        };

        engine.verify_header(&*chain, &block.header, true).context("sealed header failed verification")?;
        let number = block.number();
        let difficulty = block.header.difficulty.clone();
        let hash = chain.insert_block(block).context("insert failed")?;
        mined += 1;
        info!(number, %hash, %difficulty, hashrate = %format!("{:.0}", engine.hashrate()), "block sealed");
    }

    let headers = chain.canonical_headers(1);
    let every = settings.verify_every.max(1);
    let seals: Vec<bool> = (0..headers.len()).map(|i| i % every == 0).collect();
    let checked = seals.iter().filter(|s| **s).count();
    let view: Arc<dyn ChainView> = chain.clone();
    let mut verification = engine.verify_headers(view, headers, seals);
    let mut verified = 0usize;
    while let Some(result) = verification.recv().await {
        result.with_context(|| format!("re-verification failed at block {}", verified + 1))?;
        verified += 1;
    }
    tokio::task::spawn_blocking(move || verification.wait())
        .await
        .context("verification workers did not shut down")?;
    debug!(verified, seals = checked, "chain re-verified");

    info!(
        blocks = mined,
        verified,
        elapsed_secs = %format!("{:.2}", started.elapsed().as_secs_f64()),
        hashrate = %format!("{:.0}", engine.hashrate()),
        "mining complete"
    );
    engine.close().context("engine close failed")?;
    Ok(())
}
