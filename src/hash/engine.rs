//! Streaming SimHash engine.
//!
//! Consumes `(key, feature, weight)` observations one at a time and keeps, per key, `num_bits`
//! running dot products against random hyperplanes. The feature vectors themselves are never
//! stored, so memory is `O(keys × num_bits)` regardless of vocabulary size.
//!
//! # Concurrency
//!
//! The engine does no internal locking. [`SimHashEngine::update`] takes `&mut self`; callers
//! feeding it from several threads must serialise access themselves (e.g. a
//! `parking_lot::Mutex<SimHashEngine>`, or one engine per shard of keys merged before
//! finalization). A single update is not atomic across its `num_bits` additions.
//!
//! # Example
//!
//! ```rust
//! use pleb_lsh::hash::{SimHashConfig, SimHashEngine};
//!
//! # fn main() -> Result<(), pleb_lsh::PlebError> {
//! let mut engine = SimHashEngine::new(SimHashConfig::new(64).with_seed(7))?;
//! engine.update("doc-a", "x", 1.0)?;
//! engine.update("doc-a", "y", 1.0)?;
//! engine.update("doc-b", "x", 1.0)?;
//! engine.update("doc-b", "y", 1.0)?;
//! engine.finalize();
//!
//! assert_eq!(engine.score("doc-a", "doc-b"), Some(1.0));
//! assert_eq!(engine.score("doc-a", "missing"), None);
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PlebError, Result};
use crate::hash::projection::{feature_hash, ProjectionPool};
use crate::hash::signature::{approximate_cosine, Signature};

/// Engine parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimHashConfig {
    /// Signature length in bits. Must be a positive multiple of 8.
    pub num_bits: usize,
    /// Number of Gaussian values in the shared projection pool.
    pub pool_size: usize,
    /// Pool seed. `None` (or 0) draws a random seed and logs a warning.
    pub seed: Option<u64>,
    /// Keep accumulators after [`SimHashEngine::finalize`] so training can resume.
    pub keep_sums: bool,
}

impl Default for SimHashConfig {
    fn default() -> Self {
        Self {
            num_bits: 256,
            pool_size: 100_000,
            seed: None,
            keep_sums: false,
        }
    }
}

impl SimHashConfig {
    pub fn new(num_bits: usize) -> Self {
        Self {
            num_bits,
            ..Self::default()
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_keep_sums(mut self, keep_sums: bool) -> Self {
        self.keep_sums = keep_sums;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_bits == 0 || self.num_bits % 8 != 0 {
            return Err(PlebError::InvalidParameter(format!(
                "num_bits must be a positive multiple of 8, got {}",
                self.num_bits
            )));
        }
        if self.pool_size == 0 {
            return Err(PlebError::InvalidParameter(
                "pool_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Bytes per packed signature.
    pub fn num_bytes(&self) -> usize {
        self.num_bits / 8
    }
}

/// Streaming signature accumulator over many keys.
#[derive(Debug, Clone)]
pub struct SimHashEngine {
    config: SimHashConfig,
    pool: ProjectionPool,
    signatures: HashMap<String, Signature>,
    /// Allow-list of keys; unseen keys outside it are never inserted.
    filter: Option<HashSet<String>>,
}

impl SimHashEngine {
    /// Create an engine, drawing a fresh projection pool.
    pub fn new(config: SimHashConfig) -> Result<Self> {
        config.validate()?;
        let pool = ProjectionPool::new(config.num_bits, config.pool_size, config.seed)?;
        // Record the seed actually used so snapshots can replay it.
        let config = SimHashConfig {
            seed: Some(pool.seed()),
            ..config
        };
        Ok(Self::from_parts(config, pool, HashMap::new()))
    }

    /// Create an engine around an existing (e.g. deployment-wide) pool.
    pub fn with_pool(config: SimHashConfig, pool: ProjectionPool) -> Result<Self> {
        config.validate()?;
        if pool.num_bits() != config.num_bits {
            return Err(PlebError::InvalidParameter(format!(
                "pool has {} salts but config asks for {} bits",
                pool.num_bits(),
                config.num_bits
            )));
        }
        Ok(Self::from_parts(config, pool, HashMap::new()))
    }

    pub(crate) fn from_parts(
        config: SimHashConfig,
        pool: ProjectionPool,
        signatures: HashMap<String, Signature>,
    ) -> Self {
        Self {
            config,
            pool,
            signatures,
            filter: None,
        }
    }

    /// Restrict future insertions to `keys`. Keys already present are kept.
    pub fn set_filter<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter = Some(keys.into_iter().map(Into::into).collect());
    }

    pub fn clear_filter(&mut self) {
        self.filter = None;
    }

    /// Add one weighted feature observation to `key`.
    ///
    /// Returns `Ok(false)` when the key is new and rejected by the filter. Fails with
    /// [`PlebError::Frozen`] if the key's accumulators were discarded by finalization.
    pub fn update<F: Hash + ?Sized>(&mut self, key: &str, feature: &F, weight: f64) -> Result<bool> {
        let h = feature_hash(feature);
        self.update_hashed(key, std::iter::once((h, weight)))
    }

    /// Add several weighted features to `key`. Each feature counts as one update for strength.
    ///
    /// An empty batch changes nothing: an unseen key is not created and `Ok(false)` is
    /// returned for it.
    pub fn update_features<'f, F, I>(&mut self, key: &str, features: I) -> Result<bool>
    where
        F: Hash + ?Sized + 'f,
        I: IntoIterator<Item = (&'f F, f64)>,
    {
        self.update_hashed(
            key,
            features.into_iter().map(|(f, w)| (feature_hash(f), w)),
        )
    }

    fn update_hashed<I>(&mut self, key: &str, features: I) -> Result<bool>
    where
        I: IntoIterator<Item = (u64, f64)>,
    {
        let mut features = features.into_iter().peekable();
        if features.peek().is_none() {
            return Ok(self.signatures.contains_key(key));
        }
        if !self.signatures.contains_key(key) {
            if let Some(filter) = &self.filter {
                if !filter.contains(key) {
                    return Ok(false);
                }
            }
            self.signatures
                .insert(key.to_string(), Signature::new(self.config.num_bits));
        }
        let pool = &self.pool;
        let signature = self
            .signatures
            .get_mut(key)
            .ok_or_else(|| PlebError::UnknownKey(key.to_string()))?;

        for (h, weight) in features {
            let sums = signature
                .sums_for_update()
                .ok_or_else(|| PlebError::Frozen(key.to_string()))?;
            for (bit, sum) in sums.iter_mut().enumerate() {
                *sum += (weight * pool.value_for_hash(bit, h)) as f32;
            }
        }
        Ok(true)
    }

    /// Pack the signature for one key. Returns the packed bytes, or `None` for an unknown key.
    pub fn build_signature(&mut self, key: &str) -> Option<&[u8]> {
        let signature = self.signatures.get_mut(key)?;
        signature.build();
        signature.bits()
    }

    /// Pack every signature.
    pub fn build_all_signatures(&mut self) {
        for signature in self.signatures.values_mut() {
            signature.build();
        }
    }

    /// Pack every signature, then drop accumulators unless `keep_sums` is set.
    pub fn finalize(&mut self) {
        self.build_all_signatures();
        if !self.config.keep_sums {
            for signature in self.signatures.values_mut() {
                signature.discard_sums();
            }
        }
        debug!(
            keys = self.signatures.len(),
            keep_sums = self.config.keep_sums,
            "signatures finalized"
        );
    }

    /// Estimated cosine between two keys' built signatures; `None` if either is missing.
    pub fn score(&self, a: &str, b: &str) -> Option<f64> {
        let a = self.signatures.get(a)?.bits()?;
        let b = self.signatures.get(b)?.bits()?;
        Some(approximate_cosine(a, b))
    }

    pub fn get(&self, key: &str) -> Option<&Signature> {
        self.signatures.get(key)
    }

    /// Packed bits for `key` if built.
    pub fn bits(&self, key: &str) -> Option<&[u8]> {
        self.signatures.get(key)?.bits()
    }

    pub fn strength(&self, key: &str) -> Option<u64> {
        self.signatures.get(key).map(Signature::strength)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.signatures.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.signatures.keys().map(String::as_str)
    }

    pub fn signatures(&self) -> impl Iterator<Item = (&str, &Signature)> {
        self.signatures.iter().map(|(k, s)| (k.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn num_bits(&self) -> usize {
        self.config.num_bits
    }

    pub fn config(&self) -> &SimHashConfig {
        &self.config
    }

    pub fn pool(&self) -> &ProjectionPool {
        &self.pool
    }
}
