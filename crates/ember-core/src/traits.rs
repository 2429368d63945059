//! Collaborator interfaces consumed by the consensus engine.
//!
//! - [`ChainView`]: read-only access to the local chain (storage implements)
//! - [`StateDb`]: the account state the finalizer credits rewards to
//!   (execution layer implements)
//!
//! The engine never implements these. In-memory versions live in
//! [`crate::chain`] for tests and local tooling.

use num_bigint::BigUint;

use crate::config::ChainConfig;
use crate::error::ChainError;
use crate::types::{Address, Block, Hash256, Header};

/// Read-only view of the local chain.
///
/// Must be safe for concurrent use: batch verification calls into it from
/// several worker threads at once.
pub trait ChainView: Send + Sync {
    /// Chain configuration. Shared by every validator call for this chain.
    fn config(&self) -> &ChainConfig;

    /// Head of the canonical chain.
    fn current_header(&self) -> Result<Header, ChainError>;

    /// Header by hash and number. `None` if unknown.
    fn get_header(&self, hash: &Hash256, number: u64) -> Result<Option<Header>, ChainError>;

    /// Canonical header at `number`. `None` if beyond the tip.
    fn get_header_by_number(&self, number: u64) -> Result<Option<Header>, ChainError>;

    /// Header by hash on any known branch.
    fn get_header_by_hash(&self, hash: &Hash256) -> Result<Option<Header>, ChainError>;

    /// Total difficulty of the chain ending at the given block.
    fn get_total_difficulty(&self, hash: &Hash256, number: u64) -> Result<Option<BigUint>, ChainError>;

    /// Full block by hash and number. Used for uncle verification.
    fn get_block(&self, hash: &Hash256, number: u64) -> Result<Option<Block>, ChainError>;

    /// Parent of `header`, if known.
    ///
    /// Default implementation delegates to [`get_header`](Self::get_header).
    fn parent_of(&self, header: &Header) -> Result<Option<Header>, ChainError> {
        match header.number.checked_sub(1) {
            Some(number) => self.get_header(&header.parent_hash, number),
            None => Ok(None),
        }
    }
}

/// Mutable account state touched during finalization.
///
/// Exclusively owned by the caller for the duration of a finalize call.
/// The finalizer never retains it.
pub trait StateDb {
    /// Credit `amount` to `address`.
    fn add_balance(&mut self, address: &Address, amount: &BigUint);

    /// Current balance of `address`. Zero if never credited.
    fn balance(&self, address: &Address) -> BigUint;

    /// Commitment over the current state.
    fn intermediate_root(&self) -> Hash256;
}
