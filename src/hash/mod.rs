//! Streaming SimHash signatures.
//!
//! ## The idea
//!
//! Project a feature vector onto random hyperplanes and keep only the sign of each
//! projection. Two vectors land on the same side of a random hyperplane with probability
//! `1 - θ(a,b)/π` (Charikar 2002), so the fraction of differing bits estimates the angle and
//! `cos(π · d / num_bits)` estimates cosine similarity.
//!
//! ## Streaming
//!
//! The vectors here are sparse, high-dimensional and arrive as a stream of
//! `(key, feature, weight)` triples, so nothing is ever materialised. Each key keeps
//! `num_bits` running sums; an observation adds `weight × projection(bit, feature)` to every
//! sum, where the projection is looked up in a shared Gaussian pool through a salted feature
//! hash (Van Durme & Lall 2010, "Online generation of locality sensitive hash signatures").
//!
//! ```text
//! (key, feature, w) ──► sums[key][b] += w · pool[h(feature, salt_b) mod |pool|]   for b in 0..num_bits
//!                                   │
//!                        finalize   ▼
//!                      bits[key][b] = sums[key][b] > 0
//! ```
//!
//! ## Choosing `num_bits`
//!
//! The estimator's variance falls linearly with `num_bits` while storage and comparison cost
//! grow linearly. 256 bits is a reasonable default for corpus-scale similarity; 64 is enough
//! for coarse deduplication.
//!
//! ## References
//!
//! - Charikar (2002). "Similarity estimation techniques from rounding algorithms"
//! - Van Durme & Lall (2010). "Online generation of locality sensitive hash signatures"

pub mod bits;
pub mod engine;
pub mod projection;
pub mod signature;

pub use engine::{SimHashConfig, SimHashEngine};
pub use projection::{new_projection_pool, new_salts, ProjectionPool};
pub use signature::{approximate_cosine, try_approximate_cosine, Signature};
