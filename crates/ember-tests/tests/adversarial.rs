//! Adversarial property tests.
//!
//! Attack vectors covered:
//! - Timestamp manipulation against the difficulty adjuster
//! - Forged nonces and mix digests on sealed headers
//! - Headers from the far future
//! - Signature transplanting between authority headers

use std::sync::{Arc, OnceLock};

use num_bigint::BigUint;
use proptest::prelude::*;

use ember_consensus::Engine;
use ember_consensus::pow::hashing;
use ember_core::chain::MemoryChain;
use ember_core::config::PowParams;
use ember_core::difficulty::calc_difficulty;
use ember_core::error::ConsensusError;
use ember_core::traits::ChainView;
use ember_core::types::{Address, Hash256, Header};
use ember_tests::helpers::*;

fn params(interval: u64, factor: u64, minimum: u64) -> PowParams {
    PowParams {
        target_block_interval_secs: interval,
        max_adjustment_factor: factor,
        minimum_difficulty: BigUint::from(minimum),
        genesis_difficulty: BigUint::from(minimum),
    }
}

fn parent_at(timestamp: u64, difficulty: u64) -> Header {
    Header { timestamp, difficulty: BigUint::from(difficulty), number: 10, ..Header::default() }
}

/// One sealed child of genesis, mined once and shared across cases.
fn sealed_fixture() -> &'static (Arc<MemoryChain>, Header) {
    static FIXTURE: OnceLock<(Arc<MemoryChain>, Header)> = OnceLock::new();
    FIXTURE.get_or_init(|| {
        let config = pow_config(256);
        let (base, headers) = sealed_run(&config, 1);
        (base, headers[0].clone())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn difficulty_moves_at_most_factor(
        parent_diff in 1u64..1_000_000_000,
        elapsed in 0u64..10_000,
        interval in 1u64..60,
        factor in 2u64..8,
    ) {
        let p = params(interval, factor, 1);
        let parent = parent_at(1_000_000, parent_diff);
        let next = calc_difficulty(&p, &parent, parent.timestamp + elapsed);
        let d = BigUint::from(parent_diff);
        prop_assert!(next <= &d * factor);
        prop_assert!(next >= &d / factor);
        prop_assert!(next >= BigUint::from(1u8));
    }

    #[test]
    fn slower_blocks_never_raise_difficulty(
        parent_diff in 1u64..1_000_000_000,
        a in 0u64..5_000,
        b in 0u64..5_000,
    ) {
        let p = params(13, 4, 1);
        let parent = parent_at(500, parent_diff);
        let (fast, slow) = if a <= b { (a, b) } else { (b, a) };
        let d_fast = calc_difficulty(&p, &parent, parent.timestamp + fast);
        let d_slow = calc_difficulty(&p, &parent, parent.timestamp + slow);
        prop_assert!(d_fast >= d_slow);
    }

    #[test]
    fn difficulty_is_pure(
        parent_diff in 1u64..u64::MAX,
        ts in 0u64..u64::MAX,
        minimum in 1u64..1_000,
    ) {
        let p = params(10, 4, minimum);
        let parent = parent_at(1_000, parent_diff);
        prop_assert_eq!(calc_difficulty(&p, &parent, ts), calc_difficulty(&p, &parent, ts));
        prop_assert!(calc_difficulty(&p, &parent, ts) >= BigUint::from(minimum));
    }

    #[test]
    fn forged_nonce_is_rejected(nonce in any::<u64>()) {
        let (_, sealed) = sealed_fixture();
        prop_assume!(nonce != sealed.nonce);
        let mut forged = sealed.clone();
        forged.nonce = nonce;
        prop_assert_eq!(hashing::verify_seal(&forged), Err(ConsensusError::InvalidMixDigest));
    }

    #[test]
    fn forged_mix_is_rejected(mix in any::<[u8; 32]>()) {
        let (chain, sealed) = sealed_fixture();
        prop_assume!(Hash256(mix) != sealed.mix_digest);
        let mut forged = sealed.clone();
        forged.mix_digest = Hash256(mix);
        let engine = pow_engine(&pow_config(256), 1);
        let first = engine.verify_header(chain.as_ref(), &forged, true);
        prop_assert_eq!(&first, &Err(ConsensusError::InvalidMixDigest));
        prop_assert_eq!(engine.verify_header(chain.as_ref(), &forged, true), first);
        // The same header passes when the seal is not checked.
        prop_assert_eq!(engine.verify_header(chain.as_ref(), &forged, false), Ok(()));
    }

    #[test]
    fn far_future_headers_are_retryable(ahead in 16u64..1_000_000) {
        let config = pow_config(16);
        let chain = MemoryChain::new(Arc::clone(&config));
        let engine = pow_engine(&config, 1);
        let parent = chain.current_header().unwrap();
        let mut header = child_header(&parent, Address::ZERO);
        header.timestamp = TEST_NOW + ahead;
        let err = engine.verify_header(&chain, &header, false).unwrap_err();
        prop_assert_eq!(&err, &ConsensusError::FutureBlock { timestamp: TEST_NOW + ahead, now: TEST_NOW });
        prop_assert!(err.is_retryable());
    }
}

#[test]
fn signature_cannot_move_between_headers() {
    let keys = signer_keys(2);
    let config = authority_config(&keys);
    let chain = MemoryChain::new(Arc::clone(&config));
    let engine = authority_engine(&config, Some(keys[1].clone()));

    let parent = chain.current_header().unwrap();
    let mut header = child_header(&parent, Address::ZERO);
    engine.prepare(&chain, &mut header).unwrap();
    let mut other = header.clone();
    other.gas_used = 1;

    let sig = keys[1].sign(engine.seal_hash(&header).as_bytes());
    header.extra_data[64..].copy_from_slice(&sig);
    other.extra_data[64..].copy_from_slice(&sig);
    assert_eq!(engine.verify_header(&chain, &header, true), Ok(()));
    assert_eq!(engine.verify_header(&chain, &other, true), Err(ConsensusError::InvalidSeal));
}
