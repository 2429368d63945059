//! Per-engine runtime knobs.

use serde::{Deserialize, Serialize};

use ember_core::constants::DEFAULT_HASH_BATCH;

/// Runtime settings for an engine instance.
///
/// Unlike [`ChainConfig`](ember_core::config::ChainConfig) these do not
/// affect consensus; two nodes with different values agree on every header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sealing worker threads. 0 uses available parallelism.
    pub threads: usize,
    /// Batch verification worker threads. 0 uses available parallelism.
    pub verify_workers: usize,
    /// Nonces tried between cancellation polls.
    pub hash_batch: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            verify_workers: 0,
            hash_batch: DEFAULT_HASH_BATCH,
        }
    }
}

impl EngineConfig {
    pub fn seal_threads(&self) -> usize {
        resolve(self.threads)
    }

    pub fn verify_threads(&self) -> usize {
        resolve(self.verify_workers)
    }

    pub fn hash_batch(&self) -> u64 {
        self.hash_batch.max(1)
    }
}

fn resolve(requested: usize) -> usize {
    if requested == 0 { num_cpus::get().max(1) } else { requested }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_means_available_parallelism() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.seal_threads(), num_cpus::get().max(1));
        assert!(cfg.verify_threads() >= 1);
    }

    #[test]
    fn explicit_counts_are_kept() {
        let cfg = EngineConfig { threads: 3, verify_workers: 2, hash_batch: 0 };
        assert_eq!(cfg.seal_threads(), 3);
        assert_eq!(cfg.verify_threads(), 2);
        assert_eq!(cfg.hash_batch(), 1);
    }
}
