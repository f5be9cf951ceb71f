//! Total orders over permuted signature bytes.
//!
//! An ordering sorts signatures so that items with long common prefixes (under the active
//! byte permutation) end up adjacent. Two interchangeable orders are offered:
//!
//! - [`SortOrder::Lexicographic`]: unsigned byte-by-byte comparison.
//! - [`SortOrder::Gray`]: the permuted bit string is read as a reflected Gray code and items
//!   are ordered by their position in the Gray sequence. Neighbours in Gray order differ in a
//!   single bit, so an item whose first differing bit is set lands next to its one-bit
//!   neighbour instead of half the range away as in lexicographic order.
//!
//! A [`PermutedOrder`] carries its permutation table explicitly. One is built per sort or
//! search call, so concurrent queries against different permutations never share mutable
//! comparator state.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::hash::bits::{gray_rank_with_carry, LEX_RANK};

/// Byte order used by every permutation of one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Lexicographic,
    Gray,
}

impl SortOrder {
    /// On-disk tag.
    pub fn tag(self) -> u8 {
        match self {
            SortOrder::Lexicographic => 0,
            SortOrder::Gray => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(SortOrder::Lexicographic),
            1 => Some(SortOrder::Gray),
            _ => None,
        }
    }
}

/// Comparator over signatures with bytes visited in permutation order.
#[derive(Debug, Clone, Copy)]
pub struct PermutedOrder<'a> {
    permutation: &'a [u32],
    order: SortOrder,
}

impl<'a> PermutedOrder<'a> {
    pub fn new(permutation: &'a [u32], order: SortOrder) -> Self {
        Self { permutation, order }
    }

    /// Compare two signatures. Both must be at least as long as the permutation.
    #[inline]
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self.order {
            SortOrder::Lexicographic => {
                for &pos in self.permutation {
                    let x = LEX_RANK[a[pos as usize] as usize];
                    let y = LEX_RANK[b[pos as usize] as usize];
                    if x != y {
                        return x.cmp(&y);
                    }
                }
                Ordering::Equal
            }
            SortOrder::Gray => {
                // Ranks agree up to the first difference, so one carry serves both sides.
                let mut carry = false;
                for &pos in self.permutation {
                    let (x, next) = gray_rank_with_carry(a[pos as usize], carry);
                    let (y, _) = gray_rank_with_carry(b[pos as usize], carry);
                    if x != y {
                        return x.cmp(&y);
                    }
                    carry = next;
                }
                Ordering::Equal
            }
        }
    }
}
