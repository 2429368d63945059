//! The engine facade.
//!
//! [`Engine`] is the single contract the block-import pipeline, the miner
//! and the RPC layer depend on. Each consensus algorithm is one concrete
//! implementation owning its own configuration and workers; nothing is
//! shared between variants.
//!
//! Engines are stateless between calls except for the seal job:
//! `Idle -> Sealing -> (Found | Superseded | Stopped)`.

use std::sync::Arc;

use num_bigint::BigUint;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use ember_core::error::ConsensusError;
use ember_core::traits::{ChainView, StateDb};
use ember_core::types::{Address, Block, Hash256, Header, Receipt, Transaction};

use crate::api::RpcApi;
use crate::batch::HeaderVerification;

/// Source of unix time in seconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// The system wall clock.
pub fn system_clock() -> Clock {
    Arc::new(|| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    })
}

/// A consensus engine.
pub trait Engine: Send + Sync {
    /// Engine name as used in configuration.
    fn name(&self) -> &'static str;

    /// Account credited as the producer of `header`.
    fn author(&self, header: &Header) -> Result<Address, ConsensusError>;

    /// Check `header` against its parent from `chain`. The seal is only
    /// checked when `seal` is true.
    fn verify_header(&self, chain: &dyn ChainView, header: &Header, seal: bool) -> Result<(), ConsensusError>;

    /// Verify a contiguous run of headers concurrently.
    ///
    /// Returns at once. One result per header is delivered in input order
    /// on the returned handle until it is cancelled.
    fn verify_headers(
        &self,
        chain: Arc<dyn ChainView>,
        headers: Vec<Header>,
        seals: Vec<bool>,
    ) -> HeaderVerification;

    /// Check the uncles carried by `block`.
    fn verify_uncles(&self, chain: &dyn ChainView, block: &Block) -> Result<(), ConsensusError>;

    /// Stamp consensus fields onto a header before execution and sealing.
    fn prepare(&self, chain: &dyn ChainView, header: &mut Header) -> Result<(), ConsensusError>;

    /// Apply consensus rewards to `state` and commit its root into `header`.
    ///
    /// Never retains `state` past the call.
    fn finalize(
        &self,
        chain: &dyn ChainView,
        header: &mut Header,
        state: &mut dyn StateDb,
        transactions: &[Transaction],
        uncles: &[Header],
    );

    /// [`finalize`](Self::finalize), then build the block with every body
    /// commitment filled in.
    ///
    /// Fails before touching `state` if `receipts` do not line up with
    /// `transactions` or the header's gas used.
    fn finalize_and_assemble(
        &self,
        chain: &dyn ChainView,
        header: Header,
        state: &mut dyn StateDb,
        transactions: Vec<Transaction>,
        uncles: Vec<Header>,
        receipts: &[Receipt],
    ) -> Result<Block, ConsensusError>;

    /// Start sealing `block` in the background and return immediately.
    ///
    /// A sealed copy is sent on `results` at most once. Starting another
    /// seal supersedes this one; `stop` abandons it. Errors returned here
    /// are synchronous rejections (bad difficulty, unauthorized signer,
    /// closed engine).
    fn seal(
        &self,
        chain: &dyn ChainView,
        block: Block,
        results: UnboundedSender<Block>,
        stop: CancellationToken,
    ) -> Result<(), ConsensusError>;

    /// Hash of `header` as covered by its seal.
    fn seal_hash(&self, header: &Header) -> Hash256;

    /// Difficulty a child of `parent` stamped at `time` must carry.
    fn calc_difficulty(&self, chain: &dyn ChainView, time: u64, parent: &Header) -> BigUint;

    /// RPC services this engine exposes. Forwarded, not interpreted.
    fn apis(&self, chain: &dyn ChainView) -> Vec<RpcApi>;

    /// Stop background sealing and join its threads. Idempotent.
    fn close(&self) -> Result<(), ConsensusError>;
}

/// An engine that searches for seals and can report its hashrate.
pub trait PowEngine: Engine {
    /// Seal attempts per second of the current or last job.
    fn hashrate(&self) -> f64;
}
