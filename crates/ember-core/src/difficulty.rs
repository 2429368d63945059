//! Difficulty adjustment.
//!
//! Retargets every block from the parent's difficulty and the gap between
//! the parent's timestamp and the child's. With `F` the configured maximum
//! adjustment factor, one block moves difficulty by at most `F` in either
//! direction:
//!
//! ```text
//! raw  = parent * expected / clamp(elapsed, 1, expected * F)
//! next = max(min(raw, parent * F), minimum)
//! ```
//!
//! All arithmetic is on [`BigUint`]. The function is pure: every node given
//! the same parent and timestamp computes the same value, or the chain forks.
//!
//! # Difficulty and target
//!
//! Difficulty is higher-is-harder. A seal satisfies difficulty `d` when its
//! 256-bit result, read big-endian, is `<= 2^256 / d`.

use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::config::PowParams;
use crate::error::ConfigError;
use crate::types::{Hash256, Header};

/// Difficulty for a child of `parent` stamped at `timestamp`.
///
/// A child timestamp at or before the parent's counts as the fastest
/// possible interval. Header validation rejects such children separately.
pub fn calc_difficulty(params: &PowParams, parent: &Header, timestamp: u64) -> BigUint {
    let expected = params.target_block_interval_secs.max(1);
    let factor = params.max_adjustment_factor.max(1);
    let elapsed = timestamp.saturating_sub(parent.timestamp);

    let clamped = elapsed.clamp(1, expected.saturating_mul(factor));

    let raw = &parent.difficulty * BigUint::from(expected) / BigUint::from(clamped);
    let ceiling = &parent.difficulty * BigUint::from(factor);
    let next = raw.min(ceiling);
    if next < params.minimum_difficulty {
        params.minimum_difficulty.clone()
    } else {
        next
    }
}

/// Seal target for `difficulty`: `2^256 / difficulty`.
///
/// Zero difficulty has no target; it is a configuration error, never an
/// "accept everything" value.
pub fn target(difficulty: &BigUint) -> Result<BigUint, ConfigError> {
    if difficulty.is_zero() {
        return Err(ConfigError::NonPositiveDifficulty);
    }
    Ok((BigUint::one() << 256usize) / difficulty)
}

/// Whether a 256-bit seal result (big-endian) is within `target`.
pub fn meets_target(result: &Hash256, target: &BigUint) -> bool {
    BigUint::from_bytes_be(result.as_bytes()) <= *target
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params(interval: u64, factor: u64, minimum: u64) -> PowParams {
        PowParams {
            target_block_interval_secs: interval,
            max_adjustment_factor: factor,
            minimum_difficulty: BigUint::from(minimum),
            genesis_difficulty: BigUint::from(minimum.max(1)),
        }
    }

    fn parent(difficulty: u64, timestamp: u64) -> Header {
        Header {
            difficulty: BigUint::from(difficulty),
            timestamp,
            ..Header::default()
        }
    }

    #[test]
    fn fast_block_raises_difficulty() {
        let p = params(10, 4, 1);
        let d = calc_difficulty(&p, &parent(1000, 100), 105);
        assert_eq!(d, BigUint::from(2000u32));
    }

    #[test]
    fn slow_block_lowers_difficulty_clamped() {
        let p = params(10, 4, 1);
        let d = calc_difficulty(&p, &parent(1000, 100), 150);
        // 50s clamps to 40s: 1000 * 10 / 40.
        assert_eq!(d, BigUint::from(250u32));
    }

    #[test]
    fn on_target_keeps_difficulty() {
        let p = params(10, 4, 1);
        assert_eq!(calc_difficulty(&p, &parent(1000, 0), 10), BigUint::from(1000u32));
    }

    #[test]
    fn increase_is_bounded_by_factor() {
        let p = params(10, 4, 1);
        assert_eq!(calc_difficulty(&p, &parent(1000, 50), 50), BigUint::from(4000u32));
        assert_eq!(calc_difficulty(&p, &parent(1000, 50), 52), BigUint::from(4000u32));
        assert_eq!(calc_difficulty(&p, &parent(1000, 50), 54), BigUint::from(2500u32));
    }

    #[test]
    fn floor_applies() {
        let p = params(10, 4, 900);
        assert_eq!(calc_difficulty(&p, &parent(1000, 0), 1_000), BigUint::from(900u32));
    }

    #[test]
    fn huge_difficulty_does_not_overflow() {
        let p = params(13, 4, 1);
        let big = BigUint::from(u64::MAX) * BigUint::from(u64::MAX);
        let par = Header { difficulty: big.clone(), timestamp: 0, ..Header::default() };
        let d = calc_difficulty(&p, &par, 1);
        assert!(d > big);
    }

    #[test]
    fn zero_difficulty_has_no_target() {
        assert_eq!(target(&BigUint::zero()), Err(ConfigError::NonPositiveDifficulty));
    }

    #[test]
    fn difficulty_one_accepts_everything() {
        let t = target(&BigUint::one()).unwrap();
        assert!(meets_target(&Hash256([0xFF; 32]), &t));
    }

    #[test]
    fn higher_difficulty_means_smaller_target() {
        let easy = target(&BigUint::from(2u32)).unwrap();
        let hard = target(&BigUint::from(1u32 << 20)).unwrap();
        assert!(hard < easy);
        let mut top_bit = [0u8; 32];
        top_bit[0] = 0x80;
        assert!(!meets_target(&Hash256(top_bit), &hard));
        assert!(meets_target(&Hash256::ZERO, &hard));
    }

    proptest! {
        #[test]
        fn target_shrinks_as_difficulty_grows(a in 1u64..u64::MAX, b in 1u64..u64::MAX) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            let easy = target(&BigUint::from(low)).unwrap();
            let hard = target(&BigUint::from(high)).unwrap();
            prop_assert!(hard <= easy);
            // Never more than 2^256 of work covered.
            prop_assert!(hard * BigUint::from(high) <= BigUint::one() << 256usize);
        }

        #[test]
        fn adjustment_respects_floor_and_ceiling(
            parent_diff in 1u64..u64::MAX,
            elapsed in 0u64..100_000,
            minimum in 1u64..10_000,
        ) {
            let p = params(10, 4, minimum);
            let par = parent(parent_diff, 1_000);
            let next = calc_difficulty(&p, &par, 1_000 + elapsed);
            let d = BigUint::from(parent_diff);
            prop_assert!(next >= BigUint::from(minimum));
            prop_assert!(next <= (&d * 4u8).max(BigUint::from(minimum)));
        }
    }
}
