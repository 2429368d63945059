//! Block and uncle rewards.
//!
//! The block reward is a step function of height taken from the chain's
//! [`RewardSchedule`]. Uncle rewards scale with inclusion depth: an uncle one
//! block behind its includer earns the most, and the share drops linearly
//! to `1 / (max_depth + 1)` at the deepest allowed depth.

use crate::config::RewardSchedule;
use crate::constants::NEPHEW_REWARD_DIVISOR;

/// Block reward at `height`: the last step whose `from_height <= height`.
///
/// Returns 0 if the schedule has no step at or below `height`.
pub fn block_reward(schedule: &RewardSchedule, height: u64) -> u128 {
    schedule
        .steps
        .iter()
        .take_while(|step| step.from_height <= height)
        .last()
        .map_or(0, |step| step.block_reward)
}

/// Reward for an uncle at `uncle_number` included by the block at `including_number`.
///
/// `(max_depth + 1 - depth) * block_reward / (max_depth + 1)`. Depths outside
/// `1..=max_depth` earn nothing; uncle verification rejects them anyway.
pub fn uncle_reward(block_reward: u128, uncle_number: u64, including_number: u64, max_depth: u64) -> u128 {
    let Some(depth) = including_number.checked_sub(uncle_number) else {
        return 0;
    };
    if depth == 0 || depth > max_depth {
        return 0;
    }
    let base = u128::from(max_depth) + 1;
    (base - u128::from(depth)) * block_reward / base
}

/// Bonus paid to the including miner for each uncle.
pub fn nephew_reward(block_reward: u128) -> u128 {
    block_reward / u128::from(NEPHEW_REWARD_DIVISOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RewardStep;
    use crate::constants::COIN;

    fn schedule() -> RewardSchedule {
        RewardSchedule {
            steps: vec![
                RewardStep { from_height: 0, block_reward: 5 * COIN },
                RewardStep { from_height: 100, block_reward: 3 * COIN },
                RewardStep { from_height: 200, block_reward: 2 * COIN },
            ],
        }
    }

    #[test]
    fn step_downs_apply_at_activation() {
        let s = schedule();
        assert_eq!(block_reward(&s, 0), 5 * COIN);
        assert_eq!(block_reward(&s, 99), 5 * COIN);
        assert_eq!(block_reward(&s, 100), 3 * COIN);
        assert_eq!(block_reward(&s, 199), 3 * COIN);
        assert_eq!(block_reward(&s, u64::MAX), 2 * COIN);
    }

    #[test]
    fn empty_schedule_pays_nothing() {
        assert_eq!(block_reward(&RewardSchedule { steps: vec![] }, 10), 0);
    }

    #[test]
    fn nearer_uncles_earn_more() {
        let r = 8 * COIN;
        let d1 = uncle_reward(r, 9, 10, 7);
        let d2 = uncle_reward(r, 8, 10, 7);
        let d7 = uncle_reward(r, 3, 10, 7);
        assert_eq!(d1, 7 * COIN);
        assert_eq!(d2, 6 * COIN);
        assert_eq!(d7, COIN);
        assert!(d1 > d2 && d2 > d7);
    }

    #[test]
    fn out_of_range_uncles_earn_nothing() {
        assert_eq!(uncle_reward(COIN, 10, 10, 7), 0);
        assert_eq!(uncle_reward(COIN, 2, 10, 7), 0);
        assert_eq!(uncle_reward(COIN, 11, 10, 7), 0);
    }

    #[test]
    fn nephew_gets_one_thirty_second() {
        assert_eq!(nephew_reward(32 * COIN), COIN);
    }
}
