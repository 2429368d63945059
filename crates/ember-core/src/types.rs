//! Core protocol types: headers, blocks, transactions, receipts.
//!
//! Headers are immutable once sealed. Anything that changes a header after
//! sealing (a new nonce, a new signature) produces a new header value via
//! [`Block::with_seal`] rather than mutating a verified one.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::ConsensusError;

/// A 32-byte hash value.
///
/// Used for header hashes (double SHA-256), seal hashes, transaction and
/// receipt IDs, and commitments (BLAKE3).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 20-byte account address.
///
/// Block rewards are credited to addresses; authority signers are identified
/// by the address derived from their public key (see [`crate::crypto`]).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero address.
    pub const ZERO: Self = Self([0u8; 20]);

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

/// Block header.
///
/// `difficulty` is an arbitrary-precision integer: the seal of a header must
/// satisfy `hash <= 2^256 / difficulty`, so higher is harder. `mix_digest` and
/// `nonce` are the proof-of-work seal fields; authority chains keep them zero
/// and carry their seal in the tail of `extra_data` instead.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Hash of the parent header.
    pub parent_hash: Hash256,
    /// Commitment over the block's uncle headers.
    pub uncle_hash: Hash256,
    /// Beneficiary of the block reward.
    pub coinbase: Address,
    /// State commitment after finalization.
    pub state_root: Hash256,
    /// Merkle root of the block's transaction IDs.
    pub tx_root: Hash256,
    /// Merkle root of the block's receipt IDs.
    pub receipt_root: Hash256,
    /// Difficulty the seal must satisfy.
    pub difficulty: BigUint,
    /// Height in the chain; genesis is 0.
    pub number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Free-form bytes, bounded by the chain configuration.
    pub extra_data: Vec<u8>,
    /// Proof-of-work mix digest.
    pub mix_digest: Hash256,
    /// Proof-of-work nonce.
    pub nonce: u64,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            parent_hash: Hash256::ZERO,
            uncle_hash: Hash256::ZERO,
            coinbase: Address::ZERO,
            state_root: Hash256::ZERO,
            tx_root: Hash256::ZERO,
            receipt_root: Hash256::ZERO,
            difficulty: BigUint::default(),
            number: 0,
            gas_limit: 0,
            gas_used: 0,
            timestamp: 0,
            extra_data: Vec::new(),
            mix_digest: Hash256::ZERO,
            nonce: 0,
        }
    }
}

impl Header {
    /// Compute the header hash (double SHA-256 over every field).
    ///
    /// Layout: the unsealed fields as written by [`unsealed_bytes`](Self::unsealed_bytes)
    /// using the full `extra_data`, followed by `mix_digest || nonce` (little-endian).
    pub fn hash(&self) -> Hash256 {
        let mut data = self.unsealed_bytes(&self.extra_data);
        data.extend_from_slice(self.mix_digest.as_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        let first = Sha256::digest(&data);
        Hash256(Sha256::digest(first).into())
    }

    /// Canonical byte layout of every field except the seal.
    ///
    /// `extra` replaces `self.extra_data` so that signature-based engines can
    /// exclude the signature section. Variable-length fields are prefixed
    /// with their length as a little-endian u64.
    pub fn unsealed_bytes(&self, extra: &[u8]) -> Vec<u8> {
        let difficulty = self.difficulty.to_bytes_be();
        let mut data = Vec::with_capacity(6 * 32 + 20 + 5 * 8 + difficulty.len() + extra.len() + 16);
        data.extend_from_slice(self.parent_hash.as_bytes());
        data.extend_from_slice(self.uncle_hash.as_bytes());
        data.extend_from_slice(self.coinbase.as_bytes());
        data.extend_from_slice(self.state_root.as_bytes());
        data.extend_from_slice(self.tx_root.as_bytes());
        data.extend_from_slice(self.receipt_root.as_bytes());
        data.extend_from_slice(&(difficulty.len() as u64).to_le_bytes());
        data.extend_from_slice(&difficulty);
        data.extend_from_slice(&self.number.to_le_bytes());
        data.extend_from_slice(&self.gas_limit.to_le_bytes());
        data.extend_from_slice(&self.gas_used.to_le_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data.extend_from_slice(&(extra.len() as u64).to_le_bytes());
        data.extend_from_slice(extra);
        data
    }
}

/// A transaction. Execution is external; the engine only commits to it.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    pub nonce: u64,
    /// Recipient. `None` for contract creation.
    pub to: Option<Address>,
    pub value: u128,
    pub gas_limit: u64,
    pub payload: Vec<u8>,
}

impl Transaction {
    /// Transaction ID: BLAKE3 of the canonical bincode encoding.
    pub fn id(&self) -> Result<Hash256, ConsensusError> {
        encode_and_hash(self)
    }
}

/// Outcome of executing one transaction.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Receipt {
    pub success: bool,
    /// Gas used by this transaction and every one before it in the block.
    pub cumulative_gas_used: u64,
}

impl Receipt {
    /// Receipt ID: BLAKE3 of the canonical bincode encoding.
    pub fn id(&self) -> Result<Hash256, ConsensusError> {
        encode_and_hash(self)
    }
}

fn encode_and_hash<T: bincode::Encode>(value: &T) -> Result<Hash256, ConsensusError> {
    let encoded = bincode::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| ConsensusError::Encoding(e.to_string()))?;
    Ok(Hash256(blake3::hash(&encoded).into()))
}

/// A complete block: header, ordered transactions and uncle headers.
///
/// A block's identity is the hash of its header.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
    /// Stale-but-valid competing headers included for partial reward.
    pub uncles: Vec<Header>,
}

impl Block {
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// Copy of this block with the header replaced by a sealed one.
    pub fn with_seal(&self, header: Header) -> Self {
        Self {
            header,
            transactions: self.transactions.clone(),
            uncles: self.uncles.clone(),
        }
    }
}
