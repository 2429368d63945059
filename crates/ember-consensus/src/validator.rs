//! Header and uncle validation.
//!
//! [`verify_header`] runs the rule checks in a fixed order so the error a
//! caller sees for a given header never depends on scheduling:
//!
//! 1. future-drift (`FutureBlock`, retryable)
//! 2. number (`InvalidNumber`)
//! 3. timestamp against the parent (`InvalidTimestamp`)
//! 4. difficulty, recomputed and compared
//! 5. extra-data length, then gas limit and gas used
//! 6. algorithm-specific fields
//! 7. seal, only when requested
//!
//! Engine-specific rules plug in through [`HeaderRules`]. Everything here is
//! pure apart from the clock read and [`ChainView`] lookups.

use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;

use tracing::debug;

use ember_core::config::ChainConfig;
use ember_core::error::ConsensusError;
use ember_core::traits::ChainView;
use ember_core::types::{Block, Hash256, Header};

/// Algorithm-specific hooks used by the shared validation pipeline.
///
/// Implementations must be pure functions of their inputs (and the clock)
/// and safe to call from many verification workers at once.
pub trait HeaderRules: Send + Sync {
    fn chain_config(&self) -> &ChainConfig;

    /// Current unix time in seconds.
    fn now(&self) -> u64;

    /// Earliest timestamp a child of `parent` may carry.
    fn min_timestamp(&self, parent: &Header) -> u64 {
        parent.timestamp.saturating_add(1)
    }

    /// Allowed `extra_data` lengths.
    fn extra_data_bounds(&self) -> RangeInclusive<usize> {
        0..=self.chain_config().max_extra_data
    }

    /// Recompute the difficulty `header` must carry and compare.
    fn verify_difficulty(&self, header: &Header, parent: &Header) -> Result<(), ConsensusError>;

    /// Algorithm-specific structural fields.
    fn verify_fields(&self, header: &Header) -> Result<(), ConsensusError>;

    /// Cryptographic seal check.
    fn verify_seal(&self, header: &Header) -> Result<(), ConsensusError>;
}

/// Verify `header` against its already-known `parent`.
pub fn verify_header(
    rules: &dyn HeaderRules,
    header: &Header,
    parent: &Header,
    seal: bool,
) -> Result<(), ConsensusError> {
    let config = rules.chain_config();

    let now = rules.now();
    if header.timestamp > now.saturating_add(config.allowed_future_secs) {
        return Err(ConsensusError::FutureBlock { timestamp: header.timestamp, now });
    }

    verify_number(header, parent)?;

    let minimum = rules.min_timestamp(parent);
    if header.timestamp < minimum {
        return Err(ConsensusError::InvalidTimestamp { timestamp: header.timestamp, minimum });
    }

    rules.verify_difficulty(header, parent)?;

    let bounds = rules.extra_data_bounds();
    if !bounds.contains(&header.extra_data.len()) {
        return Err(ConsensusError::InvalidExtraData {
            len: header.extra_data.len(),
            min: *bounds.start(),
            max: *bounds.end(),
        });
    }
    verify_gas(config, header, parent)?;

    rules.verify_fields(header)?;

    if seal {
        rules.verify_seal(header)?;
    }
    Ok(())
}

/// Look up the parent through `chain`, then [`verify_header`].
pub fn verify_with_chain(
    rules: &dyn HeaderRules,
    chain: &dyn ChainView,
    header: &Header,
    seal: bool,
) -> Result<(), ConsensusError> {
    let parent = resolve_parent(chain, header)?;
    verify_header(rules, header, &parent, seal)
}

/// Parent of `header` as known to `chain`.
///
/// Falls back to a lookup by hash alone, so a known parent paired with a
/// wrong block number still resolves and the number check reports it.
/// `UnknownAncestor` means the parent hash itself is unknown.
pub fn resolve_parent(chain: &dyn ChainView, header: &Header) -> Result<Header, ConsensusError> {
    if let Some(parent) = chain.parent_of(header)? {
        return Ok(parent);
    }
    chain
        .get_header_by_hash(&header.parent_hash)?
        .ok_or(ConsensusError::UnknownAncestor)
}

/// `header` must sit exactly one block above `parent`.
pub fn verify_number(header: &Header, parent: &Header) -> Result<(), ConsensusError> {
    let expected = parent.number.saturating_add(1);
    if header.number != expected {
        return Err(ConsensusError::InvalidNumber { got: header.number, expected });
    }
    Ok(())
}

fn verify_gas(config: &ChainConfig, header: &Header, parent: &Header) -> Result<(), ConsensusError> {
    if header.gas_limit > config.max_gas_limit {
        return Err(ConsensusError::InvalidGasLimit(format!(
            "{} above maximum {}",
            header.gas_limit, config.max_gas_limit
        )));
    }
    if header.gas_used > header.gas_limit {
        return Err(ConsensusError::InvalidGasUsed { used: header.gas_used, limit: header.gas_limit });
    }
    let diff = header.gas_limit.abs_diff(parent.gas_limit);
    let bound = parent.gas_limit / config.gas_limit_bound_divisor.max(1);
    if diff >= bound {
        return Err(ConsensusError::InvalidGasLimit(format!(
            "{} moved {} from parent {}, bound {}",
            header.gas_limit, diff, parent.gas_limit, bound
        )));
    }
    if header.gas_limit < config.min_gas_limit {
        return Err(ConsensusError::InvalidGasLimit(format!(
            "{} below minimum {}",
            header.gas_limit, config.min_gas_limit
        )));
    }
    Ok(())
}

/// Verify the uncles included in `block`.
///
/// Collects the last `max_uncle_depth + 1` ancestors of `block` and every
/// uncle they already include, then checks each uncle in order:
/// not a duplicate, not an ancestor, depth in `1..=max_uncle_depth`, parent
/// among the ancestors but not `block`'s own parent, and a valid header
/// (seal included) against that parent.
pub fn verify_uncles(
    rules: &dyn HeaderRules,
    chain: &dyn ChainView,
    block: &Block,
) -> Result<(), ConsensusError> {
    if block.uncles.is_empty() {
        return Ok(());
    }
    let config = rules.chain_config();
    if block.uncles.len() > config.max_uncles {
        return Err(ConsensusError::TooManyUncles { count: block.uncles.len(), max: config.max_uncles });
    }

    let mut seen: HashSet<Hash256> = HashSet::new();
    let mut ancestors: HashMap<Hash256, Header> = HashMap::new();

    let mut parent_hash = block.header.parent_hash;
    let mut number = block.number().checked_sub(1);
    for _ in 0..=config.max_uncle_depth {
        let Some(n) = number else { break };
        let Some(ancestor) = chain.get_block(&parent_hash, n)? else { break };
        for uncle in &ancestor.uncles {
            seen.insert(uncle.hash());
        }
        let next_parent = ancestor.header.parent_hash;
        ancestors.insert(parent_hash, ancestor.header);
        parent_hash = next_parent;
        number = n.checked_sub(1);
    }
    let own_hash = block.hash();
    ancestors.insert(own_hash, block.header.clone());
    seen.insert(own_hash);

    for uncle in &block.uncles {
        let hash = uncle.hash();
        if !seen.insert(hash) {
            debug!(%hash, "rejecting duplicate uncle");
            return Err(ConsensusError::DuplicateUncle(hash.to_string()));
        }
        if ancestors.contains_key(&hash) {
            debug!(%hash, "rejecting uncle that is an ancestor");
            return Err(ConsensusError::UncleIsAncestor(hash.to_string()));
        }
        let depth = block.number().saturating_sub(uncle.number);
        if uncle.number >= block.number() || depth > config.max_uncle_depth {
            return Err(ConsensusError::UncleTooOld { depth, max: config.max_uncle_depth });
        }
        let parent = match ancestors.get(&uncle.parent_hash) {
            Some(parent) if uncle.parent_hash != block.header.parent_hash => parent,
            _ => {
                debug!(%hash, parent = %uncle.parent_hash, "rejecting dangling uncle");
                return Err(ConsensusError::DanglingUncle(hash.to_string()));
            }
        };
        verify_header(rules, uncle, parent, true)?;
    }
    Ok(())
}
