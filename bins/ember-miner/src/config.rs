//! Miner settings, layered from an optional file and `EMBER_` environment
//! variables. Command-line flags are applied on top in `main`.

use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;

use ember_consensus::EngineConfig;
use ember_core::config::ChainConfig;
use ember_core::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    pub chain: ChainConfig,
    pub engine: EngineConfig,
    /// Blocks to mine before exiting.
    pub blocks: u64,
    /// Simulated seconds between blocks. Defaults to the chain's target interval.
    pub block_interval_secs: Option<u64>,
    /// Seal-check every n-th header during re-verification.
    pub verify_every: usize,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            chain: ChainConfig::default(),
            engine: EngineConfig::default(),
            blocks: 10,
            block_interval_secs: None,
            verify_every: 4,
        }
    }
}

impl MinerConfig {
    /// Load settings. `path` must exist when given; environment variables
    /// such as `EMBER_BLOCKS` or `EMBER_ENGINE__THREADS` override it.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder
            .add_source(
                Environment::with_prefix("EMBER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| ConfigError::Load(e.to_string()))
    }
}
