//! In-memory chain and state.
//!
//! [`MemoryChain`] implements [`ChainView`] over a block tree held in memory,
//! with the canonical branch chosen by total difficulty. [`MemoryState`]
//! implements [`StateDb`] over a balance map. Neither persists anything; they
//! back tests, benches and the miner binary.
//!
//! Blocks passed to [`MemoryChain::insert_block`] are expected to be verified
//! already. The chain only checks that the parent is known and the block is
//! new.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use num_bigint::BigUint;
use parking_lot::RwLock;

use crate::config::{ChainConfig, ConsensusRules};
use crate::constants::DIFF_NO_TURN;
use crate::error::ChainError;
use crate::merkle;
use crate::traits::{ChainView, StateDb};
use crate::types::{Address, Block, Hash256, Header};

/// Genesis block for `config`.
///
/// Proof-of-work chains start at the configured genesis difficulty,
/// authority chains at the out-of-turn difficulty.
pub fn genesis_block(config: &ChainConfig) -> Block {
    let difficulty = match &config.consensus {
        ConsensusRules::ProofOfWork(p) => p.genesis_difficulty.clone(),
        ConsensusRules::Authority(_) => BigUint::from(DIFF_NO_TURN),
    };
    Block {
        header: Header {
            uncle_hash: merkle::empty_uncle_hash(),
            difficulty,
            number: 0,
            gas_limit: config.genesis_gas_limit,
            timestamp: config.genesis_timestamp,
            ..Header::default()
        },
        transactions: Vec::new(),
        uncles: Vec::new(),
    }
}

#[derive(Default)]
struct Inner {
    blocks: HashMap<Hash256, Block>,
    total_difficulty: HashMap<Hash256, BigUint>,
    /// Canonical hash by number. `canonical[0]` is genesis.
    canonical: Vec<Hash256>,
}

impl Inner {
    fn head(&self) -> Result<&Block, ChainError> {
        let hash = self.canonical.last().ok_or(ChainError::EmptyChain)?;
        self.blocks
            .get(hash)
            .ok_or_else(|| ChainError::Storage(format!("canonical block {hash} missing")))
    }

    /// Re-point the canonical index at the branch ending in `head`.
    fn set_head(&mut self, head: Hash256) -> Result<(), ChainError> {
        let mut cursor = head;
        loop {
            let (number, parent) = match self.blocks.get(&cursor) {
                Some(b) => (b.header.number as usize, b.header.parent_hash),
                None => return Err(ChainError::Storage(format!("block {cursor} missing"))),
            };
            if number < self.canonical.len() && self.canonical[number] == cursor {
                break;
            }
            if number >= self.canonical.len() {
                self.canonical.resize(number + 1, Hash256::ZERO);
            }
            self.canonical[number] = cursor;
            if number == 0 {
                break;
            }
            cursor = parent;
        }
        let head_number = self.blocks.get(&head).map_or(0, |b| b.header.number as usize);
        self.canonical.truncate(head_number + 1);
        Ok(())
    }
}

/// In-memory block tree implementing [`ChainView`].
pub struct MemoryChain {
    config: Arc<ChainConfig>,
    inner: RwLock<Inner>,
}

impl MemoryChain {
    /// New chain holding only the genesis block for `config`.
    pub fn new(config: Arc<ChainConfig>) -> Self {
        let genesis = genesis_block(&config);
        let hash = genesis.hash();
        let mut inner = Inner::default();
        inner.total_difficulty.insert(hash, genesis.header.difficulty.clone());
        inner.blocks.insert(hash, genesis);
        inner.canonical.push(hash);
        Self {
            config,
            inner: RwLock::new(inner),
        }
    }

    pub fn config_arc(&self) -> Arc<ChainConfig> {
        Arc::clone(&self.config)
    }

    /// Store a block whose parent is already known.
    ///
    /// The block becomes the new head if its total difficulty exceeds the
    /// current head's. Side branches are kept so their headers can be
    /// included as uncles.
    pub fn insert_block(&self, block: Block) -> Result<Hash256, ChainError> {
        let hash = block.hash();
        let mut inner = self.inner.write();
        if inner.blocks.contains_key(&hash) {
            return Err(ChainError::DuplicateBlock(hash.to_string()));
        }
        let parent_td = inner
            .total_difficulty
            .get(&block.header.parent_hash)
            .cloned()
            .ok_or_else(|| ChainError::UnknownParent(block.header.parent_hash.to_string()))?;
        let td = parent_td + &block.header.difficulty;
        let head_td = {
            let head = inner.head()?.hash();
            inner.total_difficulty.get(&head).cloned().unwrap_or_default()
        };

        let reorg = td > head_td;
        inner.total_difficulty.insert(hash, td);
        inner.blocks.insert(hash, block);
        if reorg {
            inner.set_head(hash)?;
        }
        Ok(hash)
    }

    /// Number of the canonical head.
    pub fn head_number(&self) -> u64 {
        self.inner.read().canonical.len().saturating_sub(1) as u64
    }

    /// Number of blocks stored across all branches, genesis included.
    pub fn block_count(&self) -> usize {
        self.inner.read().blocks.len()
    }

    /// Canonical headers from `from` to the head, in order.
    pub fn canonical_headers(&self, from: u64) -> Vec<Header> {
        let inner = self.inner.read();
        inner
            .canonical
            .iter()
            .skip(from as usize)
            .filter_map(|hash| inner.blocks.get(hash).map(|b| b.header.clone()))
            .collect()
    }
}

impl ChainView for MemoryChain {
    fn config(&self) -> &ChainConfig {
        &self.config
    }

    fn current_header(&self) -> Result<Header, ChainError> {
        Ok(self.inner.read().head()?.header.clone())
    }

    fn get_header(&self, hash: &Hash256, number: u64) -> Result<Option<Header>, ChainError> {
        Ok(self
            .inner
            .read()
            .blocks
            .get(hash)
            .filter(|b| b.header.number == number)
            .map(|b| b.header.clone()))
    }

    fn get_header_by_number(&self, number: u64) -> Result<Option<Header>, ChainError> {
        let inner = self.inner.read();
        Ok(inner
            .canonical
            .get(number as usize)
            .and_then(|hash| inner.blocks.get(hash))
            .map(|b| b.header.clone()))
    }

    fn get_header_by_hash(&self, hash: &Hash256) -> Result<Option<Header>, ChainError> {
        Ok(self.inner.read().blocks.get(hash).map(|b| b.header.clone()))
    }

    fn get_total_difficulty(&self, hash: &Hash256, number: u64) -> Result<Option<BigUint>, ChainError> {
        let inner = self.inner.read();
        match inner.blocks.get(hash) {
            Some(b) if b.header.number == number => Ok(inner.total_difficulty.get(hash).cloned()),
            _ => Ok(None),
        }
    }

    fn get_block(&self, hash: &Hash256, number: u64) -> Result<Option<Block>, ChainError> {
        Ok(self
            .inner
            .read()
            .blocks
            .get(hash)
            .filter(|b| b.header.number == number)
            .cloned())
    }
}

/// In-memory balance map implementing [`StateDb`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryState {
    balances: BTreeMap<Address, BigUint>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts with a recorded balance.
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

impl StateDb for MemoryState {
    fn add_balance(&mut self, address: &Address, amount: &BigUint) {
        *self.balances.entry(*address).or_default() += amount;
    }

    fn balance(&self, address: &Address) -> BigUint {
        self.balances.get(address).cloned().unwrap_or_default()
    }

    /// BLAKE3 over `(address, len, balance)` entries in address order.
    fn intermediate_root(&self) -> Hash256 {
        let mut hasher = blake3::Hasher::new();
        for (address, balance) in &self.balances {
            let bytes = balance.to_bytes_be();
            hasher.update(address.as_bytes());
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(&bytes);
        }
        Hash256(hasher.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(parent: &Header, difficulty: u64, tag: u8) -> Block {
        Block {
            header: Header {
                parent_hash: parent.hash(),
                number: parent.number + 1,
                timestamp: parent.timestamp + 10,
                difficulty: BigUint::from(difficulty),
                extra_data: vec![tag],
                ..Header::default()
            },
            transactions: Vec::new(),
            uncles: Vec::new(),
        }
    }

    fn chain() -> MemoryChain {
        MemoryChain::new(Arc::new(ChainConfig::default()))
    }

    #[test]
    fn starts_at_genesis() {
        let chain = chain();
        assert_eq!(chain.head_number(), 0);
        let head = chain.current_header().unwrap();
        assert_eq!(head.number, 0);
        assert_eq!(head.uncle_hash, merkle::empty_uncle_hash());
    }

    #[test]
    fn insert_extends_canonical() {
        let chain = chain();
        let g = chain.current_header().unwrap();
        let b1 = child(&g, 10, 0);
        let h1 = chain.insert_block(b1.clone()).unwrap();
        assert_eq!(chain.head_number(), 1);
        assert_eq!(chain.get_header_by_number(1).unwrap(), Some(b1.header.clone()));
        assert_eq!(chain.get_header(&h1, 1).unwrap(), Some(b1.header.clone()));
        assert_eq!(chain.get_header(&h1, 2).unwrap(), None);
        let td = chain.get_total_difficulty(&h1, 1).unwrap().unwrap();
        assert_eq!(td, &g.difficulty + BigUint::from(10u32));
    }

    #[test]
    fn unknown_parent_rejected() {
        let chain = chain();
        let orphan = child(&Header { number: 5, ..Header::default() }, 1, 0);
        assert!(matches!(chain.insert_block(orphan), Err(ChainError::UnknownParent(_))));
    }

    #[test]
    fn duplicate_rejected() {
        let chain = chain();
        let g = chain.current_header().unwrap();
        let b1 = child(&g, 10, 0);
        chain.insert_block(b1.clone()).unwrap();
        assert!(matches!(chain.insert_block(b1), Err(ChainError::DuplicateBlock(_))));
    }

    #[test]
    fn heavier_side_branch_becomes_canonical() {
        let chain = chain();
        let g = chain.current_header().unwrap();
        let a1 = child(&g, 10, 1);
        let b1 = child(&g, 5, 2);
        chain.insert_block(a1.clone()).unwrap();
        chain.insert_block(b1.clone()).unwrap();
        assert_eq!(chain.current_header().unwrap(), a1.header);
        assert_eq!(chain.block_count(), 3);

        let b2 = child(&b1.header, 10, 2);
        chain.insert_block(b2.clone()).unwrap();
        assert_eq!(chain.current_header().unwrap(), b2.header);
        assert_eq!(chain.get_header_by_number(1).unwrap(), Some(b1.header.clone()));
        // The losing branch stays reachable by hash.
        assert_eq!(chain.get_header_by_hash(&a1.hash()).unwrap(), Some(a1.header));
    }

    #[test]
    fn parent_of_uses_hash_and_number() {
        let chain = chain();
        let g = chain.current_header().unwrap();
        let b1 = child(&g, 10, 0);
        assert_eq!(chain.parent_of(&b1.header).unwrap(), Some(g.clone()));
        assert_eq!(chain.parent_of(&g).unwrap(), None);
    }

    #[test]
    fn state_root_tracks_balances() {
        let mut state = MemoryState::new();
        let empty = state.intermediate_root();
        let addr = Address([3; 20]);
        state.add_balance(&addr, &BigUint::from(5u32));
        state.add_balance(&addr, &BigUint::from(7u32));
        assert_eq!(state.balance(&addr), BigUint::from(12u32));
        assert_eq!(state.balance(&Address::ZERO), BigUint::default());
        assert_ne!(state.intermediate_root(), empty);
        assert_eq!(state.len(), 1);
    }
}
