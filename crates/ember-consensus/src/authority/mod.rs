//! Authority engine: a fixed, ordered signer set takes turns producing blocks.
//!
//! Header layout on an authority chain:
//!
//! - `extra_data` is exactly `vanity (32) || signer pubkey (32) || signature (64)`
//! - `difficulty` is 2 when the signer is in turn (`signers[number % len]`), else 1
//! - `mix_digest` and `nonce` are zero and there are no uncles
//! - timestamps advance by at least the configured period
//!
//! The seal hash covers every field except the signature section. Sealing
//! is one signature, delivered through the same asynchronous contract as
//! proof-of-work: a background thread waits for the block's timestamp (and
//! for a local signer, if none is authorized yet), signs, and publishes.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use num_bigint::BigUint;
use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use ember_core::config::{AuthorityParams, ChainConfig};
use ember_core::constants::{AUTHORITY_EXTRA_LEN, DIFF_IN_TURN, DIFF_NO_TURN, EXTRA_SEAL, EXTRA_SIGNER, EXTRA_VANITY};
use ember_core::crypto::{KeyPair, PublicKey};
use ember_core::error::{ConfigError, ConsensusError};
use ember_core::merkle;
use ember_core::traits::{ChainView, StateDb};
use ember_core::types::{Address, Block, Hash256, Header, Receipt, Transaction};

use crate::api::{AuthorityApi, RpcApi};
use crate::batch::{self, HeaderVerification};
use crate::config::EngineConfig;
use crate::engine::{Clock, Engine, system_clock};
use crate::finalizer;
use crate::sealer::{JobContext, SealWork, Sealer};
use crate::validator::{self, HeaderRules};

const POLL: Duration = Duration::from_millis(20);

/// Bytes of `extra` covered by the seal.
fn unsigned_extra(extra: &[u8]) -> &[u8] {
    &extra[..extra.len().saturating_sub(EXTRA_SEAL)]
}

/// Public key embedded in `header`'s extra-data.
fn signer_key(header: &Header) -> Result<PublicKey, ConsensusError> {
    let bytes: [u8; EXTRA_SIGNER] = header
        .extra_data
        .get(EXTRA_VANITY..EXTRA_VANITY + EXTRA_SIGNER)
        .and_then(|s| s.try_into().ok())
        .ok_or(ConsensusError::MissingSignature)?;
    Ok(PublicKey::from_bytes(&bytes)?)
}

fn signature(header: &Header) -> Result<[u8; EXTRA_SEAL], ConsensusError> {
    header
        .extra_data
        .get(EXTRA_VANITY + EXTRA_SIGNER..AUTHORITY_EXTRA_LEN)
        .and_then(|s| s.try_into().ok())
        .ok_or(ConsensusError::MissingSignature)
}

/// Seal hash: BLAKE3 over the header without its signature.
pub fn seal_hash(header: &Header) -> Hash256 {
    Hash256(blake3::hash(&header.unsealed_bytes(unsigned_extra(&header.extra_data))).into())
}

/// Difficulty `signer` must use for block `number`.
pub fn signer_difficulty(params: &AuthorityParams, number: u64, signer: &Address) -> BigUint {
    if params.in_turn(number, signer) {
        BigUint::from(DIFF_IN_TURN)
    } else {
        BigUint::from(DIFF_NO_TURN)
    }
}

#[derive(Clone)]
pub(crate) struct AuthorityRules {
    config: Arc<ChainConfig>,
    params: AuthorityParams,
    clock: Clock,
}

impl HeaderRules for AuthorityRules {
    fn chain_config(&self) -> &ChainConfig {
        &self.config
    }

    fn now(&self) -> u64 {
        (self.clock)()
    }

    fn min_timestamp(&self, parent: &Header) -> u64 {
        parent.timestamp.saturating_add(self.params.period_secs.max(1))
    }

    fn extra_data_bounds(&self) -> std::ops::RangeInclusive<usize> {
        AUTHORITY_EXTRA_LEN..=AUTHORITY_EXTRA_LEN
    }

    fn verify_difficulty(&self, header: &Header, _parent: &Header) -> Result<(), ConsensusError> {
        let in_turn = BigUint::from(DIFF_IN_TURN);
        let no_turn = BigUint::from(DIFF_NO_TURN);
        let expected = signer_key(header)
            .ok()
            .map(|key| signer_difficulty(&self.params, header.number, &key.address()));
        if header.difficulty != in_turn && header.difficulty != no_turn {
            return Err(ConsensusError::InvalidDifficulty {
                got: header.difficulty.clone(),
                expected: expected.unwrap_or(no_turn),
            });
        }
        match expected {
            Some(expected) if expected != header.difficulty => Err(ConsensusError::WrongDifficultyForSigner {
                got: header.difficulty.clone(),
                expected,
            }),
            _ => Ok(()),
        }
    }

    fn verify_fields(&self, header: &Header) -> Result<(), ConsensusError> {
        if !header.mix_digest.is_zero() {
            return Err(ConsensusError::InvalidMixDigest);
        }
        if header.nonce != 0 {
            return Err(ConsensusError::InvalidNonce);
        }
        if header.uncle_hash != merkle::empty_uncle_hash() {
            return Err(ConsensusError::InvalidUncleHash);
        }
        Ok(())
    }

    fn verify_seal(&self, header: &Header) -> Result<(), ConsensusError> {
        let key = signer_key(header)?;
        let address = key.address();
        if !self.params.is_signer(&address) {
            return Err(ConsensusError::UnauthorizedSigner(address.to_string()));
        }
        let sig = signature(header)?;
        key.verify(seal_hash(header).as_bytes(), &sig)
            .map_err(|_| ConsensusError::InvalidSeal)
    }
}

/// The authority engine.
pub struct Authority {
    rules: Arc<AuthorityRules>,
    engine: EngineConfig,
    signer: Arc<RwLock<Option<KeyPair>>>,
    sealer: Sealer,
}

impl std::fmt::Debug for Authority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authority")
            .field("chain_id", &self.rules.config.chain_id)
            .field("signers", &self.rules.params.signers.len())
            .field("local", &self.signer.read().as_ref().map(KeyPair::address))
            .finish_non_exhaustive()
    }
}

impl Authority {
    pub fn new(config: Arc<ChainConfig>, engine: EngineConfig) -> Result<Self, ConsensusError> {
        config.validate()?;
        let params = config.authority().cloned().ok_or(ConfigError::EngineMismatch {
            engine: "authority",
            configured: config.consensus.name(),
        })?;
        Ok(Self {
            rules: Arc::new(AuthorityRules { config, params, clock: system_clock() }),
            engine,
            signer: Arc::new(RwLock::new(None)),
            sealer: Sealer::new(),
        })
    }

    pub fn with_clock(mut self, clock: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        let mut rules = (*self.rules).clone();
        rules.clock = Arc::new(clock);
        self.rules = Arc::new(rules);
        self
    }

    /// Install the local signing key. A pending seal waiting for a signer
    /// picks it up.
    pub fn authorize(&self, key: KeyPair) {
        info!(signer = %key.address(), "authority signer authorized");
        *self.signer.write() = Some(key);
    }

    pub fn local_signer(&self) -> Option<Address> {
        self.signer.read().as_ref().map(KeyPair::address)
    }

    pub fn params(&self) -> &AuthorityParams {
        &self.rules.params
    }
}

impl Engine for Authority {
    fn name(&self) -> &'static str {
        "authority"
    }

    fn author(&self, header: &Header) -> Result<Address, ConsensusError> {
        Ok(signer_key(header)?.address())
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

    fn verify_uncles(&self, _chain: &dyn ChainView, block: &Block) -> Result<(), ConsensusError> {
        if block.uncles.is_empty() {
            Ok(())
        } else {
            Err(ConsensusError::TooManyUncles { count: block.uncles.len(), max: 0 })
        }
    }

    fn prepare(&self, chain: &dyn ChainView, header: &mut Header) -> Result<(), ConsensusError> {
        let parent = validator::resolve_parent(chain, header)?;
        validator::verify_number(header, &parent)?;
        let guard = self.signer.read();
        let key = guard.as_ref().ok_or(ConfigError::MissingSigner)?;

        header.difficulty = signer_difficulty(&self.rules.params, header.number, &key.address());
        let mut extra = Vec::with_capacity(AUTHORITY_EXTRA_LEN);
        extra.extend_from_slice(&header.extra_data[..header.extra_data.len().min(EXTRA_VANITY)]);
        extra.resize(EXTRA_VANITY, 0);
        extra.extend_from_slice(&key.public_key().to_bytes());
        extra.resize(AUTHORITY_EXTRA_LEN, 0);
        header.extra_data = extra;
        header.mix_digest = Hash256::ZERO;
        header.nonce = 0;
        header.uncle_hash = merkle::empty_uncle_hash();
        header.timestamp = header.timestamp.max(self.rules.min_timestamp(&parent));
        Ok(())
    }

    fn finalize(
        &self,
        _chain: &dyn ChainView,
        header: &mut Header,
        state: &mut dyn StateDb,
        _transactions: &[Transaction],
        _uncles: &[Header],
    ) {
        header.uncle_hash = merkle::empty_uncle_hash();
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
        if !uncles.is_empty() {
            return Err(ConsensusError::TooManyUncles { count: uncles.len(), max: 0 });
        }
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
        if block.header.extra_data.len() != AUTHORITY_EXTRA_LEN {
            return Err(ConsensusError::InvalidExtraData {
                len: block.header.extra_data.len(),
                min: AUTHORITY_EXTRA_LEN,
                max: AUTHORITY_EXTRA_LEN,
            });
        }
        if let Some(address) = self.local_signer() {
            if !self.rules.params.is_signer(&address) {
                return Err(ConsensusError::UnauthorizedSigner(address.to_string()));
            }
        }

        let number = block.number();
        let signer = Arc::clone(&self.signer);
        let clock = Arc::clone(&self.rules.clock);
        let params = self.rules.params.clone();
        debug!(number, timestamp = block.header.timestamp, "authority seal scheduled");

        let work: SealWork = Box::new(move |ctx: &JobContext| {
            while clock() < block.header.timestamp {
                if ctx.cancel.is_cancelled() {
                    return None;
                }
                thread::sleep(POLL);
            }
            let key = loop {
                if ctx.cancel.is_cancelled() {
                    return None;
                }
                if let Some(key) = signer.read().clone() {
                    break key;
                }
                thread::sleep(POLL);
            };
            if !params.is_signer(&key.address()) {
                debug!(number, signer = %key.address(), "local signer not authorized");
                return None;
            }

            let mut header = block.header.clone();
            header.extra_data[EXTRA_VANITY..EXTRA_VANITY + EXTRA_SIGNER]
                .copy_from_slice(&key.public_key().to_bytes());
            header.difficulty = signer_difficulty(&params, number, &key.address());
            let sig = key.sign(seal_hash(&header).as_bytes());
            header.extra_data[EXTRA_VANITY + EXTRA_SIGNER..].copy_from_slice(&sig);
            ctx.add_hashes(1);
            Some(block.with_seal(header))
        });

        self.sealer.start_job(number, &stop, results, vec![work])
    }

    fn seal_hash(&self, header: &Header) -> Hash256 {
        seal_hash(header)
    }

    fn calc_difficulty(&self, _chain: &dyn ChainView, _time: u64, parent: &Header) -> BigUint {
        match self.local_signer() {
            Some(address) => signer_difficulty(&self.rules.params, parent.number + 1, &address),
            None => BigUint::from(DIFF_NO_TURN),
        }
    }

    fn apis(&self, _chain: &dyn ChainView) -> Vec<RpcApi> {
        vec![RpcApi::new("authority", "1.0", true, AuthorityApi::new(self.rules.params.clone()))]
    }

    fn close(&self) -> Result<(), ConsensusError> {
        self.sealer.close();
        Ok(())
    }
}

impl Drop for Authority {
    fn drop(&mut self) {
        self.sealer.close();
    }
}
