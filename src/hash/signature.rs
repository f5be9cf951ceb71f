//! Per-key SimHash signatures.
//!
//! A [`Signature`] carries the running projection sums for one key while the stream is being
//! consumed, and the packed sign bits once it has been built. Hamming distance between packed
//! bits estimates the angle between the underlying feature vectors:
//!
//! ```text
//! P[sign(r·a) != sign(r·b)] = θ(a,b) / π   =>   cos θ ≈ cos(π · d / num_bits)
//! ```

use crate::error::{PlebError, Result};
use crate::hash::bits::hamming_distance;

/// Accumulators and packed bits for a single key.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    /// Packed sign bits, `num_bits / 8` bytes. `None` until built, and again after any update.
    bits: Option<Vec<u8>>,
    /// Running dot products against the random hyperplanes. `None` once discarded.
    sums: Option<Vec<f32>>,
    /// Number of update calls that contributed.
    strength: u64,
}

impl Signature {
    /// Empty accumulating signature with `num_bits` zeroed sums.
    pub fn new(num_bits: usize) -> Self {
        Self {
            bits: None,
            sums: Some(vec![0.0; num_bits]),
            strength: 0,
        }
    }

    /// Rebuild from persisted parts.
    pub fn from_parts(bits: Option<Vec<u8>>, sums: Option<Vec<f32>>, strength: u64) -> Self {
        Self {
            bits,
            sums,
            strength,
        }
    }

    /// A built signature from packed bytes alone (no accumulators).
    pub fn from_bits(bits: Vec<u8>) -> Self {
        Self::from_parts(Some(bits), None, 0)
    }

    /// Packed bits, if the signature has been built.
    pub fn bits(&self) -> Option<&[u8]> {
        self.bits.as_deref()
    }

    pub fn sums(&self) -> Option<&[f32]> {
        self.sums.as_deref()
    }

    pub fn strength(&self) -> u64 {
        self.strength
    }

    pub fn is_built(&self) -> bool {
        self.bits.is_some()
    }

    /// Drop the accumulators; the signature can no longer be updated.
    pub fn discard_sums(&mut self) {
        self.sums = None;
    }

    /// Mutable accumulators for an update. Invalidates any packed bits.
    pub(crate) fn sums_for_update(&mut self) -> Option<&mut [f32]> {
        let sums = self.sums.as_deref_mut()?;
        self.bits = None;
        self.strength += 1;
        Some(sums)
    }

    /// Pack sums into bits. Returns `false` when there is nothing to pack from.
    pub fn build(&mut self) -> bool {
        match &self.sums {
            Some(sums) => {
                self.bits = Some(pack_signs(sums));
                true
            }
            None => self.bits.is_some(),
        }
    }

    /// Hamming distance to another built signature.
    pub fn hamming_distance(&self, other: &Signature) -> Option<u32> {
        match (self.bits(), other.bits()) {
            (Some(a), Some(b)) if a.len() == b.len() => Some(hamming_distance(a, b)),
            _ => None,
        }
    }

    /// Estimated cosine similarity to another built signature.
    pub fn approximate_cosine(&self, other: &Signature) -> Option<f64> {
        match (self.bits(), other.bits()) {
            (Some(a), Some(b)) => try_approximate_cosine(a, b).ok(),
            _ => None,
        }
    }
}

/// Pack accumulator signs, 8 per byte, most-significant bit first.
///
/// A bit is set iff its sum is strictly positive: an exact `0.0` (no evidence either way,
/// including a key that was never updated) and NaN both pack to 0. A trailing partial group
/// is packed into the high bits of a final byte.
pub fn pack_signs(sums: &[f32]) -> Vec<u8> {
    sums.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |byte, (i, &s)| if s > 0.0 { byte | (0x80 >> i) } else { byte })
        })
        .collect()
}

/// Estimated cosine between two packed signatures of equal length.
///
/// `cos(π · d / num_bits)` where `d` is the Hamming distance. Always in `[-1, 1]`; identical
/// inputs give exactly `1.0`. Empty inputs are treated as identical.
#[inline]
pub fn approximate_cosine(a: &[u8], b: &[u8]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let num_bits = a.len().min(b.len()) * 8;
    if num_bits == 0 {
        return 1.0;
    }
    let d = hamming_distance(a, b);
    let theta = std::f64::consts::PI * (d as f64) / (num_bits as f64);
    theta.cos()
}

/// Like [`approximate_cosine`], but rejects inputs of different lengths.
pub fn try_approximate_cosine(a: &[u8], b: &[u8]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(PlebError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(approximate_cosine(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_most_significant_bit_first() {
        let sums = [1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0, 2.0];
        assert_eq!(pack_signs(&sums), vec![0b1000_0001]);
    }

    #[test]
    fn zero_and_nan_sums_pack_to_zero_bits() {
        let sums = [0.0, -0.0, f32::NAN, 0.5, 0.0, 0.0, 0.0, 0.0];
        assert_eq!(pack_signs(&sums), vec![0b0001_0000]);
        // A never-updated signature packs to all zeros.
        assert_eq!(pack_signs(&[0.0; 16]), vec![0, 0]);
    }

    #[test]
    fn self_similarity_is_one() {
        let bits = vec![0xA5, 0x3C, 0xFF, 0x00];
        assert_eq!(approximate_cosine(&bits, &bits), 1.0);
    }

    #[test]
    fn complement_is_minus_one() {
        let a = vec![0x00; 8];
        let b = vec![0xFF; 8];
        assert!((approximate_cosine(&a, &b) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn half_bits_differ_is_orthogonal() {
        let a = vec![0x00; 4];
        let b = vec![0x0F; 4];
        assert!(approximate_cosine(&a, &b).abs() < 1e-12);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        assert!(matches!(
            try_approximate_cosine(&[0u8; 4], &[0u8; 8]),
            Err(PlebError::DimensionMismatch { expected: 4, actual: 8 })
        ));
    }

    #[test]
    fn update_invalidates_bits() {
        let mut sig = Signature::new(8);
        sig.sums_for_update().unwrap()[0] = 1.0;
        assert!(sig.build());
        assert_eq!(sig.bits(), Some(&[0x80u8][..]));

        sig.sums_for_update().unwrap()[1] = 1.0;
        assert!(!sig.is_built());
        assert_eq!(sig.strength(), 2);

        sig.build();
        sig.discard_sums();
        assert!(sig.sums_for_update().is_none());
        assert_eq!(sig.bits(), Some(&[0xC0u8][..]));
    }
}
