//! Authority engine end to end: signer rotation, verification by a
//! non-signing node and the RPC surface.

use std::sync::Arc;

use num_bigint::BigUint;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ember_consensus::{Authority, AuthorityApi, Engine};
use ember_core::chain::{MemoryChain, MemoryState};
use ember_core::constants::{DIFF_IN_TURN, DIFF_NO_TURN};
use ember_core::error::{ConsensusError, ErrorKind};
use ember_core::traits::ChainView;
use ember_core::types::{Address, Block, Header};
use ember_tests::helpers::*;

async fn seal_next(engine: &Authority, chain: &MemoryChain) -> Block {
    let parent = chain.current_header().unwrap();
    let mut header = child_header(&parent, Address::ZERO);
    engine.prepare(chain, &mut header).unwrap();
    let block = engine
        .finalize_and_assemble(chain, header, &mut MemoryState::new(), vec![], vec![], &[])
        .unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    engine.seal(chain, block, tx, CancellationToken::new()).unwrap();
    rx.recv().await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn signers_take_turns() {
    let keys = signer_keys(3);
    let config = authority_config(&keys);
    let chain = Arc::new(MemoryChain::new(Arc::clone(&config)));
    let signers: Vec<Authority> = keys.iter().map(|k| authority_engine(&config, Some(k.clone()))).collect();

    for number in 1..=6u64 {
        let turn = (number % 3) as usize;
        let block = seal_next(&signers[turn], &chain).await;
        assert_eq!(block.header.difficulty, BigUint::from(DIFF_IN_TURN));
        assert_eq!(signers[turn].author(&block.header), Ok(keys[turn].address()));
        chain.insert_block(block).unwrap();
    }

    // A follower with no key verifies the whole run.
    let follower = authority_engine(&config, None);
    let headers = chain.canonical_headers(1);
    let genesis_only = Arc::new(MemoryChain::new(Arc::clone(&config)));
    let mut verification = follower.verify_headers(genesis_only, headers, vec![true; 6]);
    let mut count = 0;
    while let Some(result) = verification.recv().await {
        assert_eq!(result, Ok(()));
        count += 1;
    }
    assert_eq!(count, 6);
    for engine in &signers {
        engine.close().unwrap();
    }
}

#[tokio::test]
async fn out_of_turn_signer_uses_low_difficulty() {
    let keys = signer_keys(2);
    let config = authority_config(&keys);
    let chain = MemoryChain::new(Arc::clone(&config));
    // Block 1 belongs to signer 1; signer 0 seals it anyway.
    let engine = authority_engine(&config, Some(keys[0].clone()));
    let block = seal_next(&engine, &chain).await;
    assert_eq!(block.header.difficulty, BigUint::from(DIFF_NO_TURN));

    let follower = authority_engine(&config, None);
    assert_eq!(follower.verify_header(&chain, &block.header, true), Ok(()));
    assert_eq!(
        follower.calc_difficulty(&chain, block.header.timestamp, &chain.current_header().unwrap()),
        BigUint::from(DIFF_NO_TURN)
    );
}

#[tokio::test]
async fn tampered_signature_is_rejected() {
    let keys = signer_keys(2);
    let config = authority_config(&keys);
    let chain = MemoryChain::new(Arc::clone(&config));
    let engine = authority_engine(&config, Some(keys[1].clone()));
    let mut header: Header = seal_next(&engine, &chain).await.header;

    let last = header.extra_data.len() - 1;
    header.extra_data[last] ^= 0xFF;
    let err = engine.verify_header(&chain, &header, true).unwrap_err();
    assert_eq!(err, ConsensusError::InvalidSeal);
    assert_eq!(err.kind(), ErrorKind::ConsensusRule);

    header.extra_data.truncate(64);
    let err = engine.verify_header(&chain, &header, true).unwrap_err();
    assert!(matches!(err, ConsensusError::InvalidExtraData { len: 64, min: 128, max: 128 }));
}

#[test]
fn authority_api_reports_rotation() {
    let keys = signer_keys(3);
    let config = authority_config(&keys);
    let chain = MemoryChain::new(Arc::clone(&config));
    let engine = authority_engine(&config, None);
    let apis = engine.apis(&chain);
    assert_eq!(apis[0].namespace, "authority");
    let api = apis[0].service::<AuthorityApi>().unwrap();
    assert_eq!(api.signers().len(), 3);
    assert_eq!(api.in_turn(4), Some(keys[1].address()));
}

#[test]
fn unknown_parent_is_retryable() {
    let keys = signer_keys(1);
    let config = authority_config(&keys);
    let chain = MemoryChain::new(Arc::clone(&config));
    let engine = authority_engine(&config, Some(keys[0].clone()));
    let mut header = Header { number: 9, ..Header::default() };
    let err = engine.prepare(&chain, &mut header).unwrap_err();
    assert_eq!(err, ConsensusError::UnknownAncestor);
    assert!(err.is_retryable());
}
