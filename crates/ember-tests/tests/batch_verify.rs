//! Batch verification through the engine facade and with gated rules.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ember_consensus::batch;
use ember_consensus::{Engine, HeaderRules};
use ember_core::chain::MemoryChain;
use ember_core::config::ChainConfig;
use ember_core::error::ConsensusError;
use ember_core::traits::ChainView;
use ember_core::types::{Address, Hash256, Header};
use ember_tests::helpers::*;

#[tokio::test]
async fn results_follow_input_order() {
    let config = pow_config(8);
    let (base, mut headers) = sealed_run(&config, 24);
    // Break the seal of one header and the difficulty of another.
    headers[5].nonce = headers[5].nonce.wrapping_add(1);
    headers[17].difficulty += 1u8;

    let engine = pow_engine(&config, 1);
    let n = headers.len();
    let view: Arc<dyn ChainView> = base;
    let mut verification = engine.verify_headers(view, headers, vec![true; n]);

    let mut results = Vec::new();
    while let Some(result) = verification.recv().await {
        results.push(result);
    }
    assert_eq!(results.len(), n);
    for (i, result) in results.iter().enumerate() {
        match i {
            5 => assert_eq!(result, &Err(ConsensusError::InvalidMixDigest)),
            17 => assert!(matches!(result, Err(ConsensusError::InvalidDifficulty { .. }))),
            // Children of a tampered header no longer link to it.
            6 | 18 => assert_eq!(result, &Err(ConsensusError::UnknownAncestor)),
            _ => assert_eq!(result, &Ok(()), "index {i}"),
        }
    }
    verification.wait();
    assert_eq!(verification.active_workers(), 0);
}

#[tokio::test]
async fn seal_flags_are_honoured() {
    let config = pow_config(8);
    let (base, mut headers) = sealed_run(&config, 6);
    headers[5].mix_digest = Hash256([0xEE; 32]);
    let engine = pow_engine(&config, 1);

    let mut unchecked = engine.verify_headers(base.clone(), headers.clone(), vec![false; 6]);
    let mut ok = 0;
    while let Some(result) = unchecked.recv().await {
        assert_eq!(result, Ok(()));
        ok += 1;
    }
    assert_eq!(ok, 6);

    let mut seals = vec![false; 6];
    seals[5] = true;
    let mut checked = engine.verify_headers(base, headers, seals);
    let mut last = None;
    while let Some(result) = checked.recv().await {
        last = Some(result);
    }
    assert_eq!(last, Some(Err(ConsensusError::InvalidMixDigest)));
}

/// Structural rules that park every header numbered above `open` until
/// `release` fires.
struct GatedRules {
    config: ChainConfig,
    open: u64,
    release: CancellationToken,
    verified: AtomicUsize,
}

impl HeaderRules for GatedRules {
    fn chain_config(&self) -> &ChainConfig {
        &self.config
    }

    fn now(&self) -> u64 {
        TEST_NOW
    }

    fn verify_difficulty(&self, _header: &Header, _parent: &Header) -> Result<(), ConsensusError> {
        Ok(())
    }

    fn verify_fields(&self, header: &Header) -> Result<(), ConsensusError> {
        while header.number > self.open && !self.release.is_cancelled() {
            std::thread::sleep(Duration::from_millis(2));
        }
        self.verified.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn verify_seal(&self, _header: &Header) -> Result<(), ConsensusError> {
        Ok(())
    }
}

fn plain_run(chain: &MemoryChain, n: usize) -> Vec<Header> {
    let mut parent = chain.current_header().unwrap();
    (0..n)
        .map(|_| {
            let header = Header { difficulty: parent.difficulty.clone(), ..child_header(&parent, Address::ZERO) };
            parent = header.clone();
            header
        })
        .collect()
}

#[tokio::test]
async fn cancel_after_k_results_delivers_exactly_k() {
    const K: usize = 5;
    let config = ChainConfig::default();
    let chain = Arc::new(MemoryChain::new(Arc::new(config.clone())));
    let headers = plain_run(&chain, 40);
    let rules = Arc::new(GatedRules {
        config,
        open: K as u64,
        release: CancellationToken::new(),
        verified: AtomicUsize::new(0),
    });

    let dyn_rules: Arc<dyn HeaderRules> = rules.clone();
    let mut verification = batch::verify_headers(dyn_rules, chain, headers, vec![true; 40], 4);
    for _ in 0..K {
        assert_eq!(verification.recv().await, Some(Ok(())));
    }
    verification.abort();
    rules.release.cancel();

    assert_eq!(verification.recv().await, None);
    verification.wait();
    assert_eq!(verification.active_workers(), 0);
    // Workers stopped pulling tasks once cancelled.
    assert!(rules.verified.load(Ordering::SeqCst) < 40);
}

#[tokio::test]
async fn dropping_handle_stops_workers() {
    let config = ChainConfig::default();
    let chain = Arc::new(MemoryChain::new(Arc::new(config.clone())));
    let headers = plain_run(&chain, 40);
    let rules = Arc::new(GatedRules {
        config,
        open: 0,
        release: CancellationToken::new(),
        verified: AtomicUsize::new(0),
    });

    let dyn_rules: Arc<dyn HeaderRules> = rules.clone();
    let verification = batch::verify_headers(dyn_rules, chain, headers, vec![false; 40], 4);
    let cancel = verification.cancel.clone();
    drop(verification);
    assert!(cancel.is_cancelled());
    rules.release.cancel();
}
