//! Block body commitments.
//!
//! Transaction and receipt roots are BLAKE3 Merkle roots with domain
//! separation (leaf `0x00`, node `0x01`); odd layers duplicate their last
//! element. The uncle commitment hashes the ordered uncle header hashes
//! under its own prefix so an empty uncle list has a fixed, non-zero value.

use crate::types::{Hash256, Header};

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;
const UNCLE_PREFIX: u8 = 0x02;

fn leaf_hash(data: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_PREFIX]);
    hasher.update(data.as_bytes());
    Hash256(hasher.finalize().into())
}

fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_PREFIX]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash256(hasher.finalize().into())
}

/// Merkle root over `leaves` (transaction or receipt IDs).
///
/// Returns [`Hash256::ZERO`] for an empty slice.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    let mut layer: Vec<Hash256> = leaves.iter().map(leaf_hash).collect();
    if layer.is_empty() {
        return Hash256::ZERO;
    }
    while layer.len() > 1 {
        layer = layer
            .chunks(2)
            .map(|pair| node_hash(&pair[0], pair.get(1).unwrap_or(&pair[0])))
            .collect();
    }
    layer[0]
}

/// Commitment over an ordered list of uncle headers.
pub fn uncle_hash(uncles: &[Header]) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[UNCLE_PREFIX]);
    hasher.update(&(uncles.len() as u64).to_le_bytes());
    for uncle in uncles {
        hasher.update(uncle.hash().as_bytes());
    }
    Hash256(hasher.finalize().into())
}

/// Commitment of a block with no uncles.
pub fn empty_uncle_hash() -> Hash256 {
    uncle_hash(&[])
}
