//! Proof-of-work engine.
//!
//! Difficulty retargets every block (see [`ember_core::difficulty`]). Seals
//! are found by scanning nonces on several threads, each owning a disjoint
//! slice of the nonce space starting from a random seed.

pub mod hashing;

use std::sync::Arc;

use num_bigint::BigUint;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use ember_core::config::{ChainConfig, PowParams};
use ember_core::difficulty;
use ember_core::error::{ConfigError, ConsensusError};
use ember_core::traits::{ChainView, StateDb};
use ember_core::types::{Address, Block, Hash256, Header, Receipt, Transaction};

use crate::api::{PowApi, RpcApi};
use crate::batch::{self, HeaderVerification};
use crate::config::EngineConfig;
use crate::engine::{Clock, Engine, PowEngine, system_clock};
use crate::finalizer;
use crate::sealer::{JobContext, SealWork, Sealer};
use crate::validator::{self, HeaderRules};

use self::hashing::Boundary;

/// Validation rules for proof-of-work headers.
#[derive(Clone)]
pub(crate) struct PowRules {
    config: Arc<ChainConfig>,
    params: PowParams,
    clock: Clock,
}

impl HeaderRules for PowRules {
    fn chain_config(&self) -> &ChainConfig {
        &self.config
    }

    fn now(&self) -> u64 {
        (self.clock)()
    }

    fn verify_difficulty(&self, header: &Header, parent: &Header) -> Result<(), ConsensusError> {
        let expected = difficulty::calc_difficulty(&self.params, parent, header.timestamp);
        if header.difficulty != expected {
            return Err(ConsensusError::InvalidDifficulty { got: header.difficulty.clone(), expected });
        }
        Ok(())
    }

    fn verify_fields(&self, _header: &Header) -> Result<(), ConsensusError> {
        Ok(())
    }

    fn verify_seal(&self, header: &Header) -> Result<(), ConsensusError> {
        hashing::verify_seal(header)
    }
}

/// The proof-of-work engine.
pub struct ProofOfWork {
    rules: Arc<PowRules>,
    engine: EngineConfig,
    sealer: Sealer,
    seed: Option<u64>,
}

impl std::fmt::Debug for ProofOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofOfWork")
            .field("chain_id", &self.rules.config.chain_id)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl ProofOfWork {
    /// Create an engine for `config`, reading the system clock.
    ///
    /// Fails if the configuration is invalid or names another engine.
    pub fn new(config: Arc<ChainConfig>, engine: EngineConfig) -> Result<Self, ConsensusError> {
        config.validate()?;
        let params = config.pow().cloned().ok_or(ConfigError::EngineMismatch {
            engine: "proof_of_work",
            configured: config.consensus.name(),
        })?;
        Ok(Self {
            rules: Arc::new(PowRules { config, params, clock: system_clock() }),
            engine,
            sealer: Sealer::new(),
            seed: None,
        })
    }

    /// Replace the clock used for future-block checks.
    pub fn with_clock(mut self, clock: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        let mut rules = (*self.rules).clone();
        rules.clock = Arc::new(clock);
        self.rules = Arc::new(rules);
        self
    }

    /// Start every nonce search at `seed` instead of a random value.
    #[cfg(any(test, feature = "testing"))]
    pub fn with_nonce_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn params(&self) -> &PowParams {
        &self.rules.params
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine
    }
}

impl Engine for ProofOfWork {
    fn name(&self) -> &'static str {
        "proof_of_work"
    }

    fn author(&self, header: &Header) -> Result<Address, ConsensusError> {
        Ok(header.coinbase)
    }

    fn verify_header(&self, chain: &dyn ChainView, header: &Header, seal: bool) -> Result<(), ConsensusError> {
        validator::verify_with_chain(&*self.rules, chain, header, seal)
    }

    fn verify_headers(
        &self,
        chain: Arc<dyn ChainView>,
        headers: Vec<Header>,
        seals: Vec<bool>,
    ) -> HeaderVerification {
        let rules: Arc<dyn HeaderRules> = self.rules.clone();
        batch::verify_headers(rules, chain, headers, seals, self.engine.verify_threads())
    }

    fn verify_uncles(&self, chain: &dyn ChainView, block: &Block) -> Result<(), ConsensusError> {
        validator::verify_uncles(&*self.rules, chain, block)
    }

    fn prepare(&self, chain: &dyn ChainView, header: &mut Header) -> Result<(), ConsensusError> {
        let parent = validator::resolve_parent(chain, header)?;
        validator::verify_number(header, &parent)?;
        header.difficulty = self.calc_difficulty(chain, header.timestamp, &parent);
        Ok(())
    }

    fn finalize(
        &self,
        _chain: &dyn ChainView,
        header: &mut Header,
        state: &mut dyn StateDb,
        _transactions: &[Transaction],
        uncles: &[Header],
    ) {
        finalizer::accumulate_rewards(&self.rules.config, state, header, uncles);
        header.state_root = state.intermediate_root();
    }

    fn finalize_and_assemble(
        &self,
        chain: &dyn ChainView,
        mut header: Header,
        state: &mut dyn StateDb,
        transactions: Vec<Transaction>,
        uncles: Vec<Header>,
        receipts: &[Receipt],
    ) -> Result<Block, ConsensusError> {
        finalizer::check_receipts(&header, &transactions, receipts)?;
        self.finalize(chain, &mut header, state, &transactions, &uncles);
        finalizer::assemble(header, transactions, uncles, receipts)
    }

    fn seal(
        &self,
        _chain: &dyn ChainView,
        block: Block,
        results: UnboundedSender<Block>,
        stop: CancellationToken,
    ) -> Result<(), ConsensusError> {
        let boundary = Boundary::from_difficulty(&block.header.difficulty)?;
        let threads = self.engine.seal_threads();
        let batch = self.engine.hash_batch();
        let seal_hash = hashing::seal_hash(&block.header);
        let seed = self.seed.unwrap_or_else(rand::random);
        let span = u64::MAX / threads as u64;
        let number = block.number();
        debug!(number, difficulty = %block.header.difficulty, threads, seed, "sealing block");

        let block = Arc::new(block);
        let work: Vec<SealWork> = (0..threads as u64)
            .map(|i| {
                let block = Arc::clone(&block);
                let boundary = boundary.clone();
                let start = seed.wrapping_add(i.wrapping_mul(span));
                Box::new(move |ctx: &JobContext| {
                    let (nonce, mix) = hashing::search(
                        &seal_hash,
                        &boundary,
                        start,
                        span,
                        batch,
                        &ctx.cancel,
                        |n| ctx.add_hashes(n),
                    )?;
                    let mut header = block.header.clone();
                    header.nonce = nonce;
                    header.mix_digest = mix;
                    Some(block.with_seal(header))
                }) as SealWork
            })
            .collect();

        self.sealer.start_job(number, &stop, results, work)
    }

    fn seal_hash(&self, header: &Header) -> Hash256 {
        hashing::seal_hash(header)
    }

    fn calc_difficulty(&self, _chain: &dyn ChainView, time: u64, parent: &Header) -> BigUint {
        difficulty::calc_difficulty(&self.rules.params, parent, time)
    }

    fn apis(&self, _chain: &dyn ChainView) -> Vec<RpcApi> {
        let api = PowApi::new(self.sealer.clone(), self.rules.params.target_block_interval_secs);
        vec![RpcApi::new("pow", "1.0", true, api)]
    }

    fn close(&self) -> Result<(), ConsensusError> {
        self.sealer.close();
        Ok(())
    }
}

impl PowEngine for ProofOfWork {
    fn hashrate(&self) -> f64 {
        self.sealer.hashrate()
    }
}

impl Drop for ProofOfWork {
    fn drop(&mut self) {
        self.sealer.close();
    }
}
