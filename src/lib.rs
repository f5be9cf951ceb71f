//! pleb-lsh: streaming SimHash signatures and permutation-based nearest neighbour search.
//!
//! Two layers, usable on their own:
//!
//! - `hash/`: accumulate compact bit signatures for keys from a stream of weighted sparse
//!   features, and estimate cosine similarity between any two keys from their signatures.
//! - `pleb/`: index a closed set of signatures under several byte permutations and answer
//!   approximate top-k neighbour queries by scanning a small window in each sorted ordering.
//!
//! Supporting modules: [`topk`] (bounded best-k selection), [`persistence`] (engine and index
//! snapshots) and [`error`].
//!
//! ```rust
//! use pleb_lsh::hash::{SimHashConfig, SimHashEngine};
//! use pleb_lsh::pleb::{IndexConfig, NeighborIndex};
//!
//! # fn main() -> Result<(), pleb_lsh::PlebError> {
//! let mut engine = SimHashEngine::new(SimHashConfig::new(64).with_pool_size(10_000).with_seed(1))?;
//! engine.update_features("a", [("x", 1.0), ("y", 1.0)])?;
//! engine.update_features("b", [("x", 1.0), ("y", 1.0)])?;
//! engine.update_features("c", [("z", 1.0)])?;
//! engine.finalize();
//!
//! let index = NeighborIndex::from_engine(&engine, &IndexConfig::new(4))?;
//! let hits = index.kbest("a", 2, 10, 4)?;
//! assert_eq!(hits.len(), 2);
//! assert_eq!(hits[0].score, 1.0);
//! # Ok(())
//! # }
//! ```
//!
//! # Critical Nuances
//!
//! ## Scores are estimates
//!
//! A score is `cos(π · d / num_bits)` for Hamming distance `d`. Its standard error shrinks
//! like `1/sqrt(num_bits)`: at 64 bits two unrelated keys routinely score ±0.2, at 256 bits
//! rarely beyond ±0.1. Identical feature streams always score exactly 1.0.
//!
//! ## Shared pools
//!
//! Signatures are only comparable when produced with the same projection pool and salts.
//! Fix the seed (or ship `pool.bin`) whenever signatures are built in more than one process.
//!
//! ## Recall is not guaranteed
//!
//! The index may miss true neighbours. Recall grows with the number of permutations and the
//! beam width; query cost grows linearly in both.

pub mod error;
pub mod hash;
pub mod persistence;
pub mod pleb;
pub mod topk;

pub use error::{PlebError, Result};
pub use hash::{Signature, SimHashConfig, SimHashEngine};
pub use pleb::{Edge, IndexConfig, Neighbor, NeighborIndex, QueryParams, SortOrder};
pub use topk::{BoundedTopK, Direction};
