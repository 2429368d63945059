//! Shared fixtures for the integration tests.

use std::sync::Arc;

use num_bigint::BigUint;

use ember_consensus::pow::hashing;
use ember_consensus::{Authority, Engine, EngineConfig, ProofOfWork};
use ember_core::chain::{MemoryChain, MemoryState};
use ember_core::config::{AuthorityParams, ChainConfig, ConsensusRules, PowParams};
use ember_core::crypto::KeyPair;
use ember_core::traits::ChainView;
use ember_core::types::{Address, Block, Header};

/// A fixed clock far ahead of every test timestamp.
pub const TEST_NOW: u64 = 1_000_000_000;

/// Seconds between consecutive test blocks.
pub const BLOCK_GAP: u64 = 10;

/// Proof-of-work chain with a 10s target, factor 4 and the given genesis difficulty.
pub fn pow_config(genesis_difficulty: u64) -> Arc<ChainConfig> {
    Arc::new(ChainConfig {
        consensus: ConsensusRules::ProofOfWork(PowParams {
            target_block_interval_secs: BLOCK_GAP,
            max_adjustment_factor: 4,
            minimum_difficulty: BigUint::from(1u8),
            genesis_difficulty: BigUint::from(genesis_difficulty),
        }),
        ..ChainConfig::default()
    })
}

pub fn pow_engine(config: &Arc<ChainConfig>, threads: usize) -> ProofOfWork {
    ProofOfWork::new(Arc::clone(config), EngineConfig { threads, verify_workers: 4, hash_batch: 256 })
        .unwrap()
        .with_clock(|| TEST_NOW)
}

/// Authority chain over `keys` with a one second period.
pub fn authority_config(keys: &[KeyPair]) -> Arc<ChainConfig> {
    Arc::new(ChainConfig {
        consensus: ConsensusRules::Authority(AuthorityParams {
            period_secs: 1,
            signers: keys.iter().map(KeyPair::address).collect(),
        }),
        ..ChainConfig::default()
    })
}

pub fn authority_engine(config: &Arc<ChainConfig>, key: Option<KeyPair>) -> Authority {
    let engine = Authority::new(Arc::clone(config), EngineConfig::default())
        .unwrap()
        .with_clock(|| TEST_NOW);
    if let Some(key) = key {
        engine.authorize(key);
    }
    engine
}

/// Deterministic signer keys.
pub fn signer_keys(n: u8) -> Vec<KeyPair> {
    (1..=n).map(|i| KeyPair::from_secret_bytes([i; 32])).collect()
}

/// Unsealed child of `parent`, before `prepare`.
pub fn child_header(parent: &Header, coinbase: Address) -> Header {
    Header {
        parent_hash: parent.hash(),
        number: parent.number + 1,
        timestamp: parent.timestamp + BLOCK_GAP,
        gas_limit: parent.gas_limit,
        coinbase,
        ..Header::default()
    }
}

/// Prepare, finalize and mine a child of `parent` on the calling thread.
/// Nothing is inserted into `chain`.
pub fn mine_child(
    engine: &dyn Engine,
    chain: &dyn ChainView,
    parent: &Header,
    coinbase: Address,
    uncles: Vec<Header>,
    state: &mut MemoryState,
) -> Block {
    let mut header = child_header(parent, coinbase);
    engine.prepare(chain, &mut header).unwrap();
    let mut block = engine
        .finalize_and_assemble(chain, header, state, Vec::new(), uncles, &[])
        .unwrap();
    assert!(hashing::mine_header(&mut block.header, u64::MAX).unwrap());
    block
}

/// Mine `n` blocks onto the head of `chain`.
pub fn extend(engine: &dyn Engine, chain: &MemoryChain, n: u64) -> Vec<Block> {
    let mut state = MemoryState::new();
    (0..n)
        .map(|_| {
            let parent = chain.current_header().unwrap();
            let block = mine_child(engine, chain, &parent, Address([1; 20]), Vec::new(), &mut state);
            chain.insert_block(block.clone()).unwrap();
            block
        })
        .collect()
}

/// `n` sealed headers following genesis, plus a fresh chain that knows only
/// genesis, for batch verification.
pub fn sealed_run(config: &Arc<ChainConfig>, n: u64) -> (Arc<MemoryChain>, Vec<Header>) {
    let engine = pow_engine(config, 1);
    let scratch = MemoryChain::new(Arc::clone(config));
    extend(&engine, &scratch, n);
    (Arc::new(MemoryChain::new(Arc::clone(config))), scratch.canonical_headers(1))
}
