//! Byte-level lookup tables shared by signature comparison and index orderings.

/// Number of set bits for every byte value.
pub const POPCOUNT: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = (i as u8).count_ones() as u8;
        i += 1;
    }
    table
};

/// Rank of every byte value under unsigned lexicographic order.
///
/// Signature bytes are `u8`, so this is the identity; it exists so both index orders go
/// through the same "byte -> rank" lookup and a different byte interpretation only needs a
/// different table.
pub const LEX_RANK: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = i as u8;
        i += 1;
    }
    table
};

/// Position of every byte value in the 8-bit reflected Gray code sequence
/// (the inverse Gray transform: `b = g ^ (g >> 1) ^ (g >> 2) ^ ...`).
pub const GRAY_RANK: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut g = i as u8;
        let mut b = g;
        while g != 0 {
            g >>= 1;
            b ^= g;
        }
        table[i] = b;
        i += 1;
    }
    table
};

/// Reflected Gray code of `n`.
#[inline]
pub const fn to_gray(n: u8) -> u8 {
    n ^ (n >> 1)
}

/// Gray-code rank of `byte` given the carry from the preceding byte.
///
/// Across a multi-byte string the inverse Gray transform is a running XOR, so every decoded
/// byte is flipped when the parity of all earlier decoded bits is odd. That parity is the low
/// bit of the previous decoded byte. Returns `(rank, carry_out)`.
#[inline]
pub fn gray_rank_with_carry(byte: u8, carry: bool) -> (u8, bool) {
    let mut rank = GRAY_RANK[byte as usize];
    if carry {
        rank = !rank;
    }
    (rank, rank & 1 == 1)
}

/// Hamming distance between two equal-length byte strings.
///
/// Extra trailing bytes of the longer input are ignored; callers check lengths.
#[inline]
pub fn hamming_distance(a: &[u8], b: &[u8]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| POPCOUNT[(x ^ y) as usize] as u32)
        .sum()
}
