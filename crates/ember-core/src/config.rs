//! Chain configuration.
//!
//! A [`ChainConfig`] is process-wide and read-only once validated. Engines
//! hold it behind an `Arc` and every validator call reads from the same value.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::ConfigError;
use crate::types::Address;

/// Process-wide, read-only chain configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub chain_id: u64,
    /// Timestamp stamped into the genesis header.
    pub genesis_timestamp: u64,
    /// Gas limit of the genesis header.
    pub genesis_gas_limit: u64,
    /// Which consensus rule set this chain runs.
    pub consensus: ConsensusRules,
    pub rewards: RewardSchedule,
    /// Upper bound on `extra_data` for proof-of-work headers.
    pub max_extra_data: usize,
    pub min_gas_limit: u64,
    pub max_gas_limit: u64,
    pub gas_limit_bound_divisor: u64,
    /// Clock-drift tolerance before a header counts as a future block.
    pub allowed_future_secs: u64,
    pub max_uncles: usize,
    pub max_uncle_depth: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 1337,
            genesis_timestamp: 0,
            genesis_gas_limit: 8_000_000,
            consensus: ConsensusRules::ProofOfWork(PowParams::default()),
            rewards: RewardSchedule::default(),
            max_extra_data: constants::MAX_EXTRA_DATA,
            min_gas_limit: constants::MIN_GAS_LIMIT,
            max_gas_limit: constants::MAX_GAS_LIMIT,
            gas_limit_bound_divisor: constants::GAS_LIMIT_BOUND_DIVISOR,
            allowed_future_secs: constants::ALLOWED_FUTURE_BLOCK_SECS,
            max_uncles: constants::MAX_UNCLES,
            max_uncle_depth: constants::MAX_UNCLE_DEPTH,
        }
    }
}

/// Consensus rule set, tagged by engine name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "snake_case")]
pub enum ConsensusRules {
    ProofOfWork(PowParams),
    Authority(AuthorityParams),
}

impl ConsensusRules {
    /// Engine name as it appears in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProofOfWork(_) => "proof_of_work",
            Self::Authority(_) => "authority",
        }
    }
}

/// Proof-of-work retargeting parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowParams {
    pub target_block_interval_secs: u64,
    /// Maximum per-block change factor in either direction.
    pub max_adjustment_factor: u64,
    pub minimum_difficulty: BigUint,
    pub genesis_difficulty: BigUint,
}

impl Default for PowParams {
    fn default() -> Self {
        Self {
            target_block_interval_secs: constants::TARGET_BLOCK_INTERVAL_SECS,
            max_adjustment_factor: constants::MAX_ADJUSTMENT_FACTOR,
            minimum_difficulty: BigUint::from(constants::MINIMUM_DIFFICULTY),
            genesis_difficulty: BigUint::from(constants::MINIMUM_DIFFICULTY),
        }
    }
}

/// Authority (signer rotation) parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthorityParams {
    /// Minimum seconds between consecutive blocks.
    pub period_secs: u64,
    /// Signers in rotation order. Block `n` is in turn for `signers[n % len]`.
    pub signers: Vec<Address>,
}

impl AuthorityParams {
    pub fn is_signer(&self, address: &Address) -> bool {
        self.signers.contains(address)
    }

    /// Whether `address` is the in-turn signer for block `number`.
    pub fn in_turn(&self, number: u64, address: &Address) -> bool {
        if self.signers.is_empty() {
            return false;
        }
        let idx = (number % self.signers.len() as u64) as usize;
        self.signers[idx] == *address
    }
}

/// One fork-activated step of the reward schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardStep {
    /// First height at which this reward applies.
    pub from_height: u64,
    /// Reward in base units.
    pub block_reward: u128,
}

/// Block reward schedule as a list of step-downs sorted by height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSchedule {
    pub steps: Vec<RewardStep>,
}

impl Default for RewardSchedule {
    fn default() -> Self {
        Self {
            steps: vec![
                RewardStep { from_height: 0, block_reward: constants::INITIAL_BLOCK_REWARD },
                RewardStep { from_height: 4_370_000, block_reward: 3 * constants::COIN },
                RewardStep { from_height: 7_280_000, block_reward: 2 * constants::COIN },
            ],
        }
    }
}

impl ChainConfig {
    /// Proof-of-work parameters, if this chain runs proof-of-work.
    pub fn pow(&self) -> Option<&PowParams> {
        match &self.consensus {
            ConsensusRules::ProofOfWork(p) => Some(p),
            ConsensusRules::Authority(_) => None,
        }
    }

    /// Authority parameters, if this chain runs the authority engine.
    pub fn authority(&self) -> Option<&AuthorityParams> {
        match &self.consensus {
            ConsensusRules::Authority(p) => Some(p),
            ConsensusRules::ProofOfWork(_) => None,
        }
    }

    /// Reject configurations the engine cannot run.
    ///
    /// Called once at engine construction. A failure here is fatal and
    /// should abort startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.consensus {
            ConsensusRules::ProofOfWork(p) => {
                if p.target_block_interval_secs == 0 {
                    return Err(ConfigError::ZeroBlockInterval);
                }
                if p.max_adjustment_factor < 2 {
                    return Err(ConfigError::AdjustmentFactorTooSmall(p.max_adjustment_factor));
                }
                if p.minimum_difficulty == BigUint::default()
                    || p.genesis_difficulty == BigUint::default()
                {
                    return Err(ConfigError::NonPositiveDifficulty);
                }
                if p.genesis_difficulty < p.minimum_difficulty {
                    return Err(ConfigError::GenesisBelowMinimum {
                        genesis: p.genesis_difficulty.clone(),
                        minimum: p.minimum_difficulty.clone(),
                    });
                }
            }
            ConsensusRules::Authority(p) => {
                if p.signers.is_empty() {
                    return Err(ConfigError::EmptySignerSet);
                }
            }
        }

        let steps = &self.rewards.steps;
        match steps.first() {
            None => return Err(ConfigError::RewardSchedule("no steps".into())),
            Some(first) if first.from_height != 0 => {
                return Err(ConfigError::RewardSchedule(format!(
                    "first step starts at height {}, expected 0",
                    first.from_height
                )));
            }
            Some(_) => {}
        }
        if steps.windows(2).any(|w| w[0].from_height >= w[1].from_height) {
            return Err(ConfigError::RewardSchedule("steps not strictly increasing".into()));
        }

        if self.min_gas_limit == 0 || self.min_gas_limit > self.max_gas_limit {
            return Err(ConfigError::GasLimitBounds(format!(
                "min {} max {}",
                self.min_gas_limit, self.max_gas_limit
            )));
        }
        if self.gas_limit_bound_divisor == 0 {
            return Err(ConfigError::GasLimitBounds("zero bound divisor".into()));
        }
        if !(self.min_gas_limit..=self.max_gas_limit).contains(&self.genesis_gas_limit) {
            return Err(ConfigError::GasLimitBounds(format!(
                "genesis gas limit {} out of range",
                self.genesis_gas_limit
            )));
        }
        Ok(())
    }
}
