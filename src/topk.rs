//! Bounded top-k selection over a stream of scored items.
//!
//! [`BoundedTopK`] keeps the `k` best `(item, score)` pairs seen so far in a binary heap whose
//! root is the *worst* held entry, so a new candidate is compared against one value and either
//! rejected or swapped in at `O(log k)`. Processing `n` candidates costs `O(n log k)` instead of
//! the `O(n log n)` of collecting and sorting everything.
//!
//! ```rust
//! use pleb_lsh::topk::{BoundedTopK, Direction};
//!
//! let mut top = BoundedTopK::new(2, Direction::Max);
//! top.insert("a", 0.1);
//! top.insert("b", 0.9);
//! top.insert("c", 0.5);
//!
//! let best: Vec<_> = top.to_vec().into_iter().map(|(item, _)| item).collect();
//! assert_eq!(best, vec!["b", "c"]);
//! ```
//!
//! # Ties
//!
//! Entries with equal scores are ordered arbitrarily (heap order). Callers that need a
//! deterministic order among ties must break them themselves.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::hash::Hash;

/// Which end of the score range is "best".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Keep the highest scores (similarities).
    #[default]
    Max,
    /// Keep the lowest scores (distances).
    Min,
}

impl Direction {
    /// Map a score onto a key where smaller is always better.
    #[inline]
    fn key(self, score: f64) -> f64 {
        match self {
            Direction::Max => -score,
            Direction::Min => score,
        }
    }

    #[inline]
    fn score(self, key: f64) -> f64 {
        match self {
            Direction::Max => -key,
            Direction::Min => key,
        }
    }
}

/// Whether the same item may be held more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Duplicates {
    #[default]
    Allow,
    Forbid,
}

/// Heap entry. Ordered by key so the heap root is the worst held entry.
#[derive(Debug, Clone)]
struct Entry<T> {
    key: f64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key.total_cmp(&other.key) == Ordering::Equal
    }
}

impl<T> Eq for Entry<T> {}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Use total_cmp for IEEE 754 total ordering (NaN-safe)
        self.key.total_cmp(&other.key)
    }
}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Fixed-capacity selection of the `k` best scored items.
#[derive(Debug, Clone)]
pub struct BoundedTopK<T> {
    capacity: usize,
    direction: Direction,
    duplicates: Duplicates,
    heap: BinaryHeap<Entry<T>>,
    /// Items currently held; maintained only when duplicates are forbidden.
    members: HashSet<T>,
}

impl<T: Clone + Eq + Hash> BoundedTopK<T> {
    /// Create a structure holding at most `capacity` items, duplicates allowed.
    pub fn new(capacity: usize, direction: Direction) -> Self {
        Self::with_duplicates(capacity, direction, Duplicates::Allow)
    }

    /// Create a structure with an explicit duplicate policy.
    pub fn with_duplicates(capacity: usize, direction: Direction, duplicates: Duplicates) -> Self {
        Self {
            capacity,
            direction,
            duplicates,
            // `capacity + 1` is the transient peak in `insert`
            heap: BinaryHeap::with_capacity(capacity.saturating_add(1).min(1 << 16)),
            members: HashSet::new(),
        }
    }

    /// Offer a candidate. Returns `true` if it is now held.
    ///
    /// Below capacity the item is always taken. At capacity it replaces the current worst
    /// entry only when strictly better. With [`Duplicates::Forbid`] an already-held item is
    /// rejected before any score comparison, even if the new score would be better.
    /// NaN scores are ignored.
    pub fn insert(&mut self, item: T, score: f64) -> bool {
        if self.capacity == 0 || score.is_nan() {
            return false;
        }
        let forbid = self.duplicates == Duplicates::Forbid;
        if forbid && self.members.contains(&item) {
            return false;
        }

        let key = self.direction.key(score);
        if self.heap.len() >= self.capacity {
            match self.heap.peek() {
                Some(worst) if key < worst.key => {}
                _ => return false,
            }
            if let Some(evicted) = self.heap.pop() {
                if forbid {
                    self.members.remove(&evicted.item);
                }
            }
        }

        if forbid {
            self.members.insert(item.clone());
        }
        self.heap.push(Entry { key, item });
        true
    }

    /// Held pairs sorted best to worst. Does not modify the structure.
    pub fn to_vec(&self) -> Vec<(T, f64)> {
        let mut entries: Vec<&Entry<T>> = self.heap.iter().collect();
        entries.sort_by(|a, b| a.key.total_cmp(&b.key));
        entries
            .into_iter()
            .map(|e| (e.item.clone(), self.direction.score(e.key)))
            .collect()
    }

    /// Consume the structure, returning pairs sorted best to worst.
    pub fn into_sorted_vec(self) -> Vec<(T, f64)> {
        let direction = self.direction;
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|e| (e.item, direction.score(e.key)))
            .collect()
    }

    /// Score of the worst held entry, if any.
    pub fn worst_score(&self) -> Option<f64> {
        self.heap.peek().map(|e| self.direction.score(e.key))
    }

    /// Whether `item` is currently held. Linear scan when duplicates are allowed.
    pub fn contains(&self, item: &T) -> bool {
        match self.duplicates {
            Duplicates::Forbid => self.members.contains(item),
            Duplicates::Allow => self.heap.iter().any(|e| &e.item == item),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.members.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items<T: Clone>(pairs: &[(T, f64)]) -> Vec<T> {
        pairs.iter().map(|(i, _)| i.clone()).collect()
    }

    #[test]
    fn keeps_highest_scores_for_max() {
        let mut top = BoundedTopK::new(3, Direction::Max);
        for (i, s) in [0.3, 0.9, 0.1, 0.7, 0.5].iter().enumerate() {
            top.insert(i, *s);
        }
        assert_eq!(items(&top.to_vec()), vec![1, 3, 4]);
        assert_eq!(top.worst_score(), Some(0.5));
    }

    #[test]
    fn keeps_lowest_scores_for_min() {
        let mut top = BoundedTopK::new(2, Direction::Min);
        for (i, s) in [3.0, 1.0, 2.0, 0.5].iter().enumerate() {
            top.insert(i, *s);
        }
        let held = top.to_vec();
        assert_eq!(items(&held), vec![3, 1]);
        assert_eq!(held[0].1, 0.5);
    }

    #[test]
    fn worse_than_worst_at_capacity_is_rejected() {
        let mut top = BoundedTopK::new(2, Direction::Max);
        top.insert("a", 0.8);
        top.insert("b", 0.6);
        let before = top.to_vec();

        assert!(!top.insert("c", 0.2));
        // Equal to the worst is not strictly better.
        assert!(!top.insert("d", 0.6));
        assert_eq!(top.to_vec(), before);
    }

    #[test]
    fn forbid_duplicates_checks_identity_first() {
        let mut top = BoundedTopK::with_duplicates(2, Direction::Max, Duplicates::Forbid);
        assert!(top.insert("a", 0.1));
        assert!(top.insert("b", 0.2));
        // "a" is held: rejected even though 0.9 beats the worst entry.
        assert!(!top.insert("a", 0.9));
        assert_eq!(top.len(), 2);
        assert!(top.contains(&"a"));

        // Evicting "a" frees it for re-insertion.
        assert!(top.insert("c", 0.5));
        assert!(!top.contains(&"a"));
        assert!(top.insert("a", 0.9));
        assert_eq!(items(&top.to_vec()), vec!["a", "c"]);
    }

    #[test]
    fn allow_duplicates_holds_repeats() {
        let mut top = BoundedTopK::new(3, Direction::Max);
        top.insert("x", 1.0);
        top.insert("x", 1.0);
        assert_eq!(top.len(), 2);
    }

    #[test]
    fn zero_capacity_and_nan_are_ignored() {
        let mut empty = BoundedTopK::new(0, Direction::Max);
        assert!(!empty.insert(1, 1.0));
        assert!(empty.is_empty());

        let mut top = BoundedTopK::new(2, Direction::Max);
        assert!(!top.insert(1, f64::NAN));
        assert!(top.is_empty());
    }

    #[test]
    fn to_vec_is_idempotent() {
        let mut top = BoundedTopK::new(4, Direction::Max);
        for i in 0..10 {
            top.insert(i, (i as f64).sin());
        }
        let first = top.to_vec();
        assert_eq!(first, top.to_vec());
        assert_eq!(first, top.clone().into_sorted_vec());
        assert!(top.is_full());
    }
}
