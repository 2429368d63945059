//! Error types for the Ember consensus engine.
//!
//! Every engine operation returns [`ConsensusError`]. Callers that need to
//! decide between retrying and rejecting use [`ConsensusError::kind`] or
//! [`ConsensusError::is_retryable`] rather than matching individual variants.
use num_bigint::BigUint;
use thiserror::Error;

/// Broad classification of a [`ConsensusError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed header or block fields. Permanent.
    Structural,
    /// Unknown or not-yet-valid ancestry. Transient: may resolve once the
    /// ancestor arrives or the local clock catches up.
    Lineage,
    /// Wrong difficulty, bad seal, bad uncles. Permanent, and a sign of a
    /// buggy or adversarial peer.
    ConsensusRule,
    /// Fatal misconfiguration. Should abort startup.
    Configuration,
    /// A collaborator (chain view, crypto backend) failed.
    Collaborator,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("unknown parent: {0}")] UnknownParent(String),
    #[error("duplicate block: {0}")] DuplicateBlock(String),
    #[error("empty chain")] EmptyChain,
    #[error("storage: {0}")] Storage(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key bytes")] InvalidPublicKey,
    #[error("invalid signature bytes")] InvalidSignature,
    #[error("signature verification failed")] VerificationFailed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("difficulty must be positive")] NonPositiveDifficulty,
    #[error("target block interval must be positive")] ZeroBlockInterval,
    #[error("max adjustment factor must be at least 2, got {0}")] AdjustmentFactorTooSmall(u64),
    #[error("genesis difficulty {genesis} below minimum {minimum}")] GenesisBelowMinimum { genesis: BigUint, minimum: BigUint },
    #[error("authority signer set is empty")] EmptySignerSet,
    #[error("reward schedule: {0}")] RewardSchedule(String),
    #[error("gas limit bounds: {0}")] GasLimitBounds(String),
    #[error("engine {engine} cannot run chain configured for {configured}")] EngineMismatch { engine: &'static str, configured: &'static str },
    #[error("no local signer configured")] MissingSigner,
    #[error("{headers} headers but {seals} seal flags")] SealFlagMismatch { headers: usize, seals: usize },
    #[error("load: {0}")] Load(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    // Lineage
    #[error("unknown ancestor")] UnknownAncestor,
    #[error("block in the future: timestamp {timestamp}, now {now}")] FutureBlock { timestamp: u64, now: u64 },

    // Structural
    #[error("invalid block number: got {got}, expected {expected}")] InvalidNumber { got: u64, expected: u64 },
    #[error("timestamp {timestamp} below minimum {minimum}")] InvalidTimestamp { timestamp: u64, minimum: u64 },
    #[error("invalid extra-data: length {len} outside {min}..={max}")] InvalidExtraData { len: usize, min: usize, max: usize },
    #[error("invalid gas limit: {0}")] InvalidGasLimit(String),
    #[error("invalid gas used: {used} > limit {limit}")] InvalidGasUsed { used: u64, limit: u64 },
    #[error("invalid uncle hash")] InvalidUncleHash,
    #[error("non-zero mix digest")] InvalidMixDigest,
    #[error("non-zero nonce")] InvalidNonce,
    #[error("missing signature")] MissingSignature,
    #[error("encoding: {0}")] Encoding(String),

    // Consensus rules
    #[error("invalid difficulty: got {got}, expected {expected}")] InvalidDifficulty { got: BigUint, expected: BigUint },
    #[error("invalid seal")] InvalidSeal,
    #[error("unauthorized signer: {0}")] UnauthorizedSigner(String),
    #[error("wrong difficulty for signer: got {got}, expected {expected}")] WrongDifficultyForSigner { got: BigUint, expected: BigUint },
    #[error("too many uncles: {count} > {max}")] TooManyUncles { count: usize, max: usize },
    #[error("duplicate uncle: {0}")] DuplicateUncle(String),
    #[error("uncle is ancestor: {0}")] UncleIsAncestor(String),
    #[error("uncle's parent is not an ancestor: {0}")] DanglingUncle(String),
    #[error("uncle at depth {depth} outside 1..={max}")] UncleTooOld { depth: u64, max: u64 },

    // Assembly
    #[error("receipt count {receipts} does not match transaction count {transactions}")] ReceiptCountMismatch { transactions: usize, receipts: usize },
    #[error("gas used mismatch: header {header}, receipts {receipts}")] GasUsedMismatch { header: u64, receipts: u64 },

    // Lifecycle and collaborators
    #[error("engine closed")] EngineClosed,
    #[error("worker thread: {0}")] Worker(String),
    #[error(transparent)] Chain(#[from] ChainError),
    #[error(transparent)] Crypto(#[from] CryptoError),
    #[error(transparent)] Config(#[from] ConfigError),
}

impl ConsensusError {
    /// Classify this error per the engine's error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownAncestor | Self::FutureBlock { .. } => ErrorKind::Lineage,
            Self::InvalidNumber { .. }
            | Self::InvalidTimestamp { .. }
            | Self::InvalidExtraData { .. }
            | Self::InvalidGasLimit(_)
            | Self::InvalidGasUsed { .. }
            | Self::InvalidUncleHash
            | Self::InvalidMixDigest
            | Self::InvalidNonce
            | Self::MissingSignature
            | Self::Encoding(_)
            | Self::ReceiptCountMismatch { .. }
            | Self::GasUsedMismatch { .. } => ErrorKind::Structural,
            Self::InvalidDifficulty { .. }
            | Self::InvalidSeal
            | Self::UnauthorizedSigner(_)
            | Self::WrongDifficultyForSigner { .. }
            | Self::TooManyUncles { .. }
            | Self::DuplicateUncle(_)
            | Self::UncleIsAncestor(_)
            | Self::DanglingUncle(_)
            | Self::UncleTooOld { .. } => ErrorKind::ConsensusRule,
            Self::Config(_) => ErrorKind::Configuration,
            Self::EngineClosed | Self::Worker(_) | Self::Chain(_) | Self::Crypto(_) => ErrorKind::Collaborator,
        }
    }

    /// Whether the same input may verify later (missing ancestor, early timestamp).
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Lineage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lineage_errors_are_retryable() {
        assert!(ConsensusError::UnknownAncestor.is_retryable());
        assert!(ConsensusError::FutureBlock { timestamp: 10, now: 1 }.is_retryable());
    }

    #[test]
    fn rule_violations_are_permanent() {
        let err = ConsensusError::InvalidDifficulty {
            got: BigUint::from(1u8),
            expected: BigUint::from(2u8),
        };
        assert_eq!(err.kind(), ErrorKind::ConsensusRule);
        assert!(!err.is_retryable());
        assert!(!ConsensusError::InvalidSeal.is_retryable());
    }

    #[test]
    fn config_errors_classify_as_configuration() {
        let err: ConsensusError = ConfigError::NonPositiveDifficulty.into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn extra_data_is_structural() {
        let err = ConsensusError::InvalidExtraData { len: 40, min: 0, max: 32 };
        assert_eq!(err.kind(), ErrorKind::Structural);
        assert_eq!(err.to_string(), "invalid extra-data: length 40 outside 0..=32");
    }

    #[test]
    fn chain_errors_convert_transparently() {
        let err: ConsensusError = ChainError::Storage("disk".into()).into();
        assert_eq!(err.to_string(), "storage: disk");
        assert_eq!(err.kind(), ErrorKind::Collaborator);
    }
}
