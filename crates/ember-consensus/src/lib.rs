//! # ember-consensus: pluggable consensus engines.
//!
//! Two engines implement the [`Engine`] facade:
//!
//! - [`ProofOfWork`]: adjustable difficulty, multi-threaded nonce search,
//!   uncles with depth-scaled rewards.
//! - [`Authority`]: a fixed signer rotation sealing blocks with Ed25519
//!   signatures.
//!
//! Both share the header validator ([`validator`]), the ordered concurrent
//! batch verifier ([`batch`]), the seal job controller ([`sealer`]) and the
//! reward/assembly helpers ([`finalizer`]).

pub mod api;
pub mod authority;
pub mod batch;
pub mod config;
pub mod engine;
pub mod finalizer;
pub mod pow;
pub mod sealer;
pub mod validator;

use std::sync::Arc;

use ember_core::config::{ChainConfig, ConsensusRules};
use ember_core::error::ConsensusError;

pub use api::{AuthorityApi, PowApi, RpcApi};
pub use authority::Authority;
pub use batch::HeaderVerification;
pub use config::EngineConfig;
pub use engine::{Clock, Engine, PowEngine};
pub use pow::ProofOfWork;
pub use sealer::Sealer;
pub use validator::HeaderRules;

/// Build the engine selected by `config.consensus`.
pub fn new_engine(config: Arc<ChainConfig>, engine: EngineConfig) -> Result<Arc<dyn Engine>, ConsensusError> {
    Ok(match config.consensus {
        ConsensusRules::ProofOfWork(_) => Arc::new(ProofOfWork::new(config, engine)?),
        ConsensusRules::Authority(_) => Arc::new(Authority::new(config, engine)?),
    })
}
