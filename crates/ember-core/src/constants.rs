//! Protocol constants and the defaults used by [`ChainConfig`](crate::config::ChainConfig).
//!
//! Values here are defaults, not law: every bound that a chain may want to
//! tune is also carried in the chain configuration. The constants are what a
//! development chain gets when nothing else is specified.

/// One whole coin in base units.
pub const COIN: u128 = 1_000_000_000_000_000_000;

/// Default maximum length of `Header::extra_data` on proof-of-work chains.
pub const MAX_EXTRA_DATA: usize = 32;

/// Fixed vanity prefix reserved in authority-chain extra-data.
pub const EXTRA_VANITY: usize = 32;

/// Length of the signer's Ed25519 public key carried in authority-chain extra-data.
pub const EXTRA_SIGNER: usize = 32;

/// Length of the Ed25519 signature that seals an authority-chain header.
pub const EXTRA_SEAL: usize = 64;

/// Exact extra-data length of a well-formed authority-chain header.
pub const AUTHORITY_EXTRA_LEN: usize = EXTRA_VANITY + EXTRA_SIGNER + EXTRA_SEAL;

/// Block difficulty for an authority header signed by the in-turn signer.
pub const DIFF_IN_TURN: u64 = 2;

/// Block difficulty for an authority header signed out of turn.
pub const DIFF_NO_TURN: u64 = 1;

/// Minimum gas limit any header may declare.
pub const MIN_GAS_LIMIT: u64 = 5_000;

/// Maximum gas limit any header may declare (2^63 - 1).
pub const MAX_GAS_LIMIT: u64 = 0x7fff_ffff_ffff_ffff;

/// The gas limit may move by less than `parent.gas_limit / GAS_LIMIT_BOUND_DIVISOR` per block.
pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 1024;

/// Seconds a header timestamp may lie ahead of the local clock before it is
/// treated as a future block.
pub const ALLOWED_FUTURE_BLOCK_SECS: u64 = 15;

/// Maximum number of uncles a single proof-of-work block may include.
pub const MAX_UNCLES: usize = 2;

/// Number of ancestors searched when validating uncles. Also the reward
/// denominator base: an uncle at depth `d` earns `(MAX_UNCLE_DEPTH + 1 - d) / (MAX_UNCLE_DEPTH + 1)`
/// of the block reward.
pub const MAX_UNCLE_DEPTH: u64 = 7;

/// The including miner earns `block_reward / NEPHEW_REWARD_DIVISOR` per uncle.
pub const NEPHEW_REWARD_DIVISOR: u64 = 32;

/// Default target spacing between proof-of-work blocks.
pub const TARGET_BLOCK_INTERVAL_SECS: u64 = 13;

/// Default maximum per-block difficulty change factor (up or down).
pub const MAX_ADJUSTMENT_FACTOR: u64 = 4;

/// Default difficulty floor.
pub const MINIMUM_DIFFICULTY: u64 = 131_072;

/// Default block reward at height 0 (before any step-down).
pub const INITIAL_BLOCK_REWARD: u128 = 5 * COIN;

/// Default number of nonces a sealing worker tries between cancellation polls.
pub const DEFAULT_HASH_BATCH: u64 = 4_096;
