//! Shared random projection pool.
//!
//! Materialising one random hyperplane per output bit over an unbounded feature vocabulary is
//! impossible, so every (feature, bit) pair instead looks up one Gaussian value in a fixed
//! pool:
//!
//! ```text
//! projection(bit, feature) = pool[hash(feature, salts[bit]) mod pool.len()]
//! ```
//!
//! With `pool.len() >> num_bits` the lookups behave like independent N(0,1) draws, which is
//! all the sign-random-projection estimator needs. The pool and salts are read-only after
//! construction and shared by every signature update.

use std::hash::{Hash, Hasher};

use fnv::FnvHasher;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::warn;

use crate::error::{PlebError, Result};

/// Offset separating the salt stream from the pool stream for one seed.
const SALT_STREAM: u64 = 0x9E37_79B9_7F4A_7C15;

/// Platform-stable hasher for features.
///
/// FNV-1a over whatever the feature's `Hash` impl writes. Unlike `DefaultHasher` its output
/// is fixed across Rust releases, which keeps persisted pools meaningful.
pub type FeatureHasher = FnvHasher;

/// Salt-independent part of a feature's hash.
#[inline]
pub fn feature_hash<F: Hash + ?Sized>(feature: &F) -> u64 {
    let mut hasher = FeatureHasher::default();
    feature.hash(&mut hasher);
    hasher.finish()
}

/// Combine a feature hash with a per-bit salt (splitmix64 finaliser).
#[inline]
pub fn salted(feature_hash: u64, salt: u64) -> u64 {
    let mut z = feature_hash ^ salt;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Resolve a configured seed. `None` and `0` draw a fresh one and warn.
pub fn resolve_seed(seed: Option<u64>) -> u64 {
    match seed {
        Some(s) if s != 0 => s,
        _ => {
            let drawn = loop {
                let s: u64 = rand::rng().random();
                if s != 0 {
                    break s;
                }
            };
            warn!(
                seed = drawn,
                "no projection seed configured; signatures from this run cannot be replayed"
            );
            drawn
        }
    }
}

/// `size` independent standard-normal draws.
pub fn new_projection_pool(size: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..size).map(|_| rng.sample(StandardNormal)).collect()
}

/// One independent salt per output bit.
pub fn new_salts(num_bits: usize, seed: u64) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(seed ^ SALT_STREAM);
    (0..num_bits).map(|_| rng.random()).collect()
}

/// Gaussian pool plus per-bit salts.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionPool {
    pool: Vec<f64>,
    salts: Vec<u64>,
    seed: u64,
}

impl ProjectionPool {
    /// Draw a pool of `pool_size` values and `num_bits` salts from `seed`.
    pub fn new(num_bits: usize, pool_size: usize, seed: Option<u64>) -> Result<Self> {
        if num_bits == 0 {
            return Err(PlebError::InvalidParameter(
                "num_bits must be > 0".to_string(),
            ));
        }
        if pool_size == 0 {
            return Err(PlebError::InvalidParameter(
                "pool_size must be > 0".to_string(),
            ));
        }
        if pool_size < num_bits {
            warn!(
                pool_size,
                num_bits, "projection pool is smaller than the bit count; bits will be correlated"
            );
        }
        let seed = resolve_seed(seed);
        Ok(Self {
            pool: new_projection_pool(pool_size, seed),
            salts: new_salts(num_bits, seed),
            seed,
        })
    }

    /// Restore from persisted parts.
    pub fn from_parts(pool: Vec<f64>, salts: Vec<u64>, seed: u64) -> Result<Self> {
        if pool.is_empty() || salts.is_empty() {
            return Err(PlebError::InvalidParameter(
                "projection pool and salts must be non-empty".to_string(),
            ));
        }
        Ok(Self { pool, salts, seed })
    }

    /// Projection of `feature` onto the hyperplane of output bit `bit`.
    #[inline]
    pub fn projection_value<F: Hash + ?Sized>(&self, bit: usize, feature: &F) -> f64 {
        self.value_for_hash(bit, feature_hash(feature))
    }

    /// Same as [`Self::projection_value`] with the feature hash computed once by the caller.
    #[inline]
    pub(crate) fn value_for_hash(&self, bit: usize, feature_hash: u64) -> f64 {
        let idx = salted(feature_hash, self.salts[bit]) % self.pool.len() as u64;
        self.pool[idx as usize]
    }

    pub fn num_bits(&self) -> usize {
        self.salts.len()
    }

    pub fn pool(&self) -> &[f64] {
        &self.pool
    }

    pub fn salts(&self) -> &[u64] {
        &self.salts
    }

    /// Seed the pool was drawn from (the drawn one when none was configured).
    pub fn seed(&self) -> u64 {
        self.seed
    }
}
