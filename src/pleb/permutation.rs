//! Byte-position permutations for the index orderings.
//!
//! Each ordering visits signature bytes in a different order so that a different byte
//! dominates the sort. Tables are derived deterministically from the identity, which means
//! they never need a seed and can be regenerated from `(num_bytes, count)` alone:
//!
//! 1. reverse the previous table,
//! 2. rotate it left by the step number,
//! 3. parity fix: if the leading byte position is even, swap the first odd position to the
//!    front.
//!
//! The parity fix keeps every derived table from starting on the same byte parity as the
//! identity. It is a decorrelation heuristic, not a guarantee of independence.

use std::collections::HashSet;

use tracing::warn;

/// One derivation step.
fn next_permutation(prev: &[u32], step: usize) -> Vec<u32> {
    let n = prev.len();
    let mut next: Vec<u32> = prev.iter().rev().copied().collect();
    if n > 1 {
        next.rotate_left(step % n);
        if next[0] % 2 == 0 {
            if let Some(j) = next.iter().position(|&p| p % 2 == 1) {
                next.swap(0, j);
            }
        }
    }
    next
}

/// `count` byte-position permutations over `num_bytes` positions, starting with the identity.
///
/// Repeated tables are skipped. When the derivation cycles before `count` distinct tables
/// exist (tiny signatures, or `count` well above `num_bytes`) the distinct tables are reused
/// round-robin and a warning is logged.
pub fn generate_permutations(num_bytes: usize, count: usize) -> Vec<Vec<u32>> {
    if count == 0 {
        return Vec::new();
    }
    let identity: Vec<u32> = (0..num_bytes as u32).collect();
    let mut tables = vec![identity.clone()];
    let mut seen: HashSet<Vec<u32>> = HashSet::new();
    seen.insert(identity.clone());

    let max_steps = count
        .saturating_mul(num_bytes.max(1))
        .saturating_mul(4);
    let mut current = identity;
    let mut step = 0;
    while tables.len() < count && step < max_steps {
        step += 1;
        current = next_permutation(&current, step);
        if seen.insert(current.clone()) {
            tables.push(current.clone());
        }
    }

    let distinct = tables.len();
    if distinct < count {
        warn!(
            num_bytes,
            requested = count,
            distinct,
            "permutation derivation cycled; reusing tables"
        );
        for i in distinct..count {
            let reused = tables[i % distinct].clone();
            tables.push(reused);
        }
    }
    tables
}

/// Whether `table` is a permutation of `0..len`.
pub fn is_permutation(table: &[u32], len: usize) -> bool {
    if table.len() != len {
        return false;
    }
    let mut seen = vec![false; len];
    for &p in table {
        match seen.get_mut(p as usize) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_table_is_identity() {
        let tables = generate_permutations(8, 4);
        assert_eq!(tables[0], (0..8).collect::<Vec<u32>>());
        assert_eq!(tables[1], vec![5, 6, 4, 3, 2, 1, 0, 7]);
    }

    #[test]
    fn tables_are_distinct_permutations() {
        for (num_bytes, count) in [(8, 4), (8, 8), (16, 16), (32, 32), (64, 64)] {
            let tables = generate_permutations(num_bytes, count);
            assert_eq!(tables.len(), count);
            let distinct: HashSet<&Vec<u32>> = tables.iter().collect();
            assert_eq!(distinct.len(), count, "{num_bytes} bytes, {count} tables");
            for t in &tables {
                assert!(is_permutation(t, num_bytes));
            }
            for t in &tables[1..] {
                assert_eq!(t[0] % 2, 1, "derived tables lead with an odd position");
            }
        }
    }

    #[test]
    fn deterministic() {
        assert_eq!(generate_permutations(32, 10), generate_permutations(32, 10));
    }

    #[test]
    fn cycles_are_reused() {
        let tables = generate_permutations(2, 3);
        assert_eq!(tables, vec![vec![0, 1], vec![1, 0], vec![0, 1]]);
        assert_eq!(generate_permutations(1, 2), vec![vec![0], vec![0]]);
        assert!(generate_permutations(8, 0).is_empty());
    }

    #[test]
    fn is_permutation_rejects_bad_tables() {
        assert!(is_permutation(&[2, 0, 1], 3));
        assert!(!is_permutation(&[0, 0, 1], 3));
        assert!(!is_permutation(&[0, 1, 3], 3));
        assert!(!is_permutation(&[0, 1], 3));
    }
}
