//! Proof-of-work seal function.
//!
//! For a header with seal hash `s` and nonce `n`:
//!
//! ```text
//! mix    = BLAKE3(s || n_le)
//! result = SHA-256(s || n_le || mix)
//! ```
//!
//! A seal is valid when `mix` matches the header's `mix_digest` and `result`,
//! read big-endian, is at most `2^256 / difficulty`.

use num_bigint::BigUint;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use ember_core::difficulty;
use ember_core::error::{ConfigError, ConsensusError};
use ember_core::types::{Hash256, Header};

/// Hash of everything in `header` except `mix_digest` and `nonce`.
pub fn seal_hash(header: &Header) -> Hash256 {
    Hash256(blake3::hash(&header.unsealed_bytes(&header.extra_data)).into())
}

/// `(mix_digest, result)` for `nonce` on top of `seal_hash`.
pub fn compute(seal_hash: &Hash256, nonce: u64) -> (Hash256, Hash256) {
    let nonce = nonce.to_le_bytes();
    let mut mixer = blake3::Hasher::new();
    mixer.update(seal_hash.as_bytes());
    mixer.update(&nonce);
    let mix = Hash256(mixer.finalize().into());

    let mut hasher = Sha256::new();
    hasher.update(seal_hash.as_bytes());
    hasher.update(nonce);
    hasher.update(mix.as_bytes());
    (mix, Hash256(hasher.finalize().into()))
}

/// Verify the mix digest and the difficulty bound of a sealed header.
pub fn verify_seal(header: &Header) -> Result<(), ConsensusError> {
    let target = difficulty::target(&header.difficulty)?;
    let (mix, result) = compute(&seal_hash(header), header.nonce);
    if mix != header.mix_digest {
        return Err(ConsensusError::InvalidMixDigest);
    }
    if !difficulty::meets_target(&result, &target) {
        return Err(ConsensusError::InvalidSeal);
    }
    Ok(())
}

/// Upper bound on a seal result, as 32 big-endian bytes for cheap comparison
/// in the search loop. `None` admits every result (difficulty 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary(Option<Hash256>);

impl Boundary {
    pub fn from_difficulty(difficulty: &BigUint) -> Result<Self, ConfigError> {
        let target = difficulty::target(difficulty)?;
        let bytes = target.to_bytes_be();
        if bytes.len() > 32 {
            return Ok(Self(None));
        }
        let mut padded = [0u8; 32];
        padded[32 - bytes.len()..].copy_from_slice(&bytes);
        Ok(Self(Some(Hash256(padded))))
    }

    pub fn admits(&self, result: &Hash256) -> bool {
        self.0.as_ref().is_none_or(|bound| result <= bound)
    }
}

/// Scan up to `count` nonces starting at `start` (wrapping), polling
/// `cancel` every `batch` attempts. Returns the first `(nonce, mix)` whose
/// result is within `boundary`.
///
/// `on_batch` is called with the number of attempts made since the last call.
pub fn search(
    seal_hash: &Hash256,
    boundary: &Boundary,
    start: u64,
    count: u64,
    batch: u64,
    cancel: &CancellationToken,
    mut on_batch: impl FnMut(u64),
) -> Option<(u64, Hash256)> {
    let batch = batch.max(1);
    let mut done = 0u64;
    while done < count {
        if cancel.is_cancelled() {
            return None;
        }
        let this_batch = batch.min(count - done);
        for offset in 0..this_batch {
            let nonce = start.wrapping_add(done + offset);
            let (mix, result) = compute(seal_hash, nonce);
            if boundary.admits(&result) {
                on_batch(offset + 1);
                return Some((nonce, mix));
            }
        }
        done += this_batch;
        on_batch(this_batch);
    }
    None
}

/// Find a seal for `header` by scanning nonces `0..=max_nonce` on the
/// calling thread. Amends `header` in place and returns `Ok(true)` on success.
pub fn mine_header(header: &mut Header, max_nonce: u64) -> Result<bool, ConsensusError> {
    let boundary = Boundary::from_difficulty(&header.difficulty)?;
    let hash = seal_hash(header);
    let never = CancellationToken::new();
    match search(&hash, &boundary, 0, max_nonce.saturating_add(1), u64::MAX, &never, |_| {}) {
        Some((nonce, mix)) => {
            header.nonce = nonce;
            header.mix_digest = mix;
            Ok(true)
        }
        None => Ok(false),
    }
}
