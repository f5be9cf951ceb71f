//! Permutation-based approximate nearest neighbour search (PLEB).
//!
//! Point Location in Equal Balls (Indyk & Motwani 1998; Charikar 2002; Ravichandran et al.
//! 2005) finds near neighbours of bit signatures without any pairwise distance matrix:
//!
//! 1. Derive `P` permutations of the signature's byte positions.
//! 2. For each permutation, sort all signatures by their permuted bytes. Signatures sharing a
//!    long prefix under that permutation end up adjacent, and a long shared prefix implies a
//!    small Hamming distance.
//! 3. To query, find the item's position in each ordering and score only the `beam_width`
//!    items around it.
//!
//! A close neighbour that differs early under one permutation usually agrees on a long
//! prefix under another, so recall grows with `P` and `beam_width` while query cost stays
//! `O(P · (log n + beam_width))`.
//!
//! ```text
//!   ordering p:  ... s₁₂ s₄₀ [s₇ s₃ ▲q s₉₁ s₂] s₅₅ ...
//!                             └── beam_width ──┘
//! ```
//!
//! ## Guarantees
//!
//! None beyond approximation: the true top-k may be missed. Results are best-first; order
//! among equal scores is unspecified.
//!
//! ## Example
//!
//! ```rust
//! use pleb_lsh::pleb::{IndexConfig, NeighborIndex, SortOrder};
//!
//! # fn main() -> Result<(), pleb_lsh::PlebError> {
//! let entries = vec![
//!     ("a", vec![0b1010_1010u8, 0xFF]),
//!     ("b", vec![0b1010_1011u8, 0xFF]),
//!     ("c", vec![0b0101_0101u8, 0x00]),
//! ];
//! let index = NeighborIndex::build(entries, &IndexConfig::new(2).with_order(SortOrder::Gray))?;
//!
//! let hits = index.kbest("a", 2, 10, 2)?;
//! assert_eq!(hits[0].key, "a");
//! assert_eq!(hits[1].key, "b");
//! # Ok(())
//! # }
//! ```
//!
//! ## References
//!
//! - Indyk & Motwani (1998). "Approximate nearest neighbors: towards removing the curse of
//!   dimensionality"
//! - Charikar (2002). "Similarity estimation techniques from rounding algorithms"
//! - Ravichandran, Pantel & Hovy (2005). "Randomized algorithms and NLP: using locality
//!   sensitive hash functions for high speed noun clustering"

pub mod index;
pub mod order;
pub mod permutation;
pub mod protocol;

pub use index::{Edge, IndexConfig, Neighbor, NeighborIndex, QueryParams};
pub use order::{PermutedOrder, SortOrder};
pub use permutation::generate_permutations;
pub use protocol::{QueryRequest, UNKNOWN};
