//! Reward application and block assembly.

use num_bigint::BigUint;
use tracing::trace;

use ember_core::config::ChainConfig;
use ember_core::error::ConsensusError;
use ember_core::merkle;
use ember_core::reward;
use ember_core::traits::StateDb;
use ember_core::types::{Block, Hash256, Header, Receipt, Transaction};

/// Credit the block reward to `header.coinbase` and the depth-scaled uncle
/// rewards to each uncle's coinbase. The includer also earns a nephew bonus
/// per uncle.
pub fn accumulate_rewards(config: &ChainConfig, state: &mut dyn StateDb, header: &Header, uncles: &[Header]) {
    let block_reward = reward::block_reward(&config.rewards, header.number);
    let mut miner_reward = block_reward;
    for uncle in uncles {
        let amount = reward::uncle_reward(block_reward, uncle.number, header.number, config.max_uncle_depth);
        trace!(uncle = uncle.number, including = header.number, %amount, "uncle reward");
        state.add_balance(&uncle.coinbase, &BigUint::from(amount));
        miner_reward = miner_reward.saturating_add(reward::nephew_reward(block_reward));
    }
    state.add_balance(&header.coinbase, &BigUint::from(miner_reward));
}

/// Reject receipts that do not match the transactions or the header.
pub fn check_receipts(header: &Header, transactions: &[Transaction], receipts: &[Receipt]) -> Result<(), ConsensusError> {
    if receipts.len() != transactions.len() {
        return Err(ConsensusError::ReceiptCountMismatch {
            transactions: transactions.len(),
            receipts: receipts.len(),
        });
    }
    let cumulative = receipts.last().map_or(0, |r| r.cumulative_gas_used);
    if cumulative != header.gas_used {
        return Err(ConsensusError::GasUsedMismatch { header: header.gas_used, receipts: cumulative });
    }
    Ok(())
}

/// Fill the body commitments into `header` and build the block.
pub fn assemble(
    mut header: Header,
    transactions: Vec<Transaction>,
    uncles: Vec<Header>,
    receipts: &[Receipt],
) -> Result<Block, ConsensusError> {
    check_receipts(&header, &transactions, receipts)?;
    let tx_ids = transactions.iter().map(Transaction::id).collect::<Result<Vec<Hash256>, _>>()?;
    let receipt_ids = receipts.iter().map(Receipt::id).collect::<Result<Vec<Hash256>, _>>()?;
    header.tx_root = merkle::merkle_root(&tx_ids);
    header.receipt_root = merkle::merkle_root(&receipt_ids);
    header.uncle_hash = merkle::uncle_hash(&uncles);
    Ok(Block { header, transactions, uncles })
}
