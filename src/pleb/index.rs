//! Permutation index over a closed set of signatures.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::Range;
use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PlebError, Result};
use crate::hash::signature::approximate_cosine;
use crate::hash::SimHashEngine;
use crate::pleb::order::{PermutedOrder, SortOrder};
use crate::pleb::permutation::{generate_permutations, is_permutation};
use crate::topk::{BoundedTopK, Direction, Duplicates};

/// Default query parameters (used by the line protocol when a request omits them).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    /// Number of neighbours returned.
    pub k: usize,
    /// Candidates examined around the query in each ordering.
    pub beam_width: usize,
    /// Upper bound on orderings probed; clamped to the number built.
    pub max_permutations: usize,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            k: 10,
            beam_width: 50,
            max_permutations: usize::MAX,
        }
    }
}

/// Index build parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Number of permuted orderings (`P`).
    pub num_permutations: usize,
    /// Byte order shared by every ordering.
    pub order: SortOrder,
    /// Defaults for [`NeighborIndex::answer`].
    pub query: QueryParams,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            num_permutations: 10,
            order: SortOrder::Lexicographic,
            query: QueryParams::default(),
        }
    }
}

impl IndexConfig {
    pub fn new(num_permutations: usize) -> Self {
        Self {
            num_permutations,
            ..Self::default()
        }
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_permutations == 0 {
            return Err(PlebError::InvalidParameter(
                "num_permutations must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// One query result.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// Internal id (position in [`NeighborIndex::keys`]).
    pub id: u32,
    pub key: String,
    /// Estimated cosine similarity to the query.
    pub score: f64,
}

/// One edge of the approximate k-NN graph, by internal id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub source: u32,
    pub target: u32,
    pub score: f64,
}

/// Approximate nearest-neighbour index over SimHash signatures (PLEB).
///
/// Built once from a closed snapshot; immutable afterwards and safe to query from many
/// threads at once. The only mutation is [`NeighborIndex::realign`], which re-attaches
/// signature bytes to an index that was loaded on its own.
#[derive(Debug, Clone)]
pub struct NeighborIndex {
    keys: Vec<String>,
    ids: HashMap<String, u32>,
    num_bytes: usize,
    order: SortOrder,
    permutations: Vec<Vec<u32>>,
    orderings: Vec<Vec<u32>>,
    /// Signature bytes, `num_bytes` per id. `None` until aligned.
    signatures: Option<Vec<u8>>,
    query: QueryParams,
}

impl NeighborIndex {
    /// Build from `(key, signature bytes)` pairs with derived permutations.
    pub fn build<K, S, I>(entries: I, config: &IndexConfig) -> Result<Self>
    where
        K: Into<String>,
        S: AsRef<[u8]>,
        I: IntoIterator<Item = (K, S)>,
    {
        config.validate()?;
        let (keys, num_bytes, table) = collect_entries(entries)?;
        let permutations = generate_permutations(num_bytes, config.num_permutations);
        Self::assemble(keys, num_bytes, table, permutations, config)
    }

    /// Build with caller-supplied byte permutations (one ordering per table).
    pub fn build_with_permutations<K, S, I>(
        entries: I,
        permutations: Vec<Vec<u32>>,
        config: &IndexConfig,
    ) -> Result<Self>
    where
        K: Into<String>,
        S: AsRef<[u8]>,
        I: IntoIterator<Item = (K, S)>,
    {
        if permutations.is_empty() {
            return Err(PlebError::InvalidParameter(
                "at least one permutation is required".to_string(),
            ));
        }
        let (keys, num_bytes, table) = collect_entries(entries)?;
        Self::assemble(keys, num_bytes, table, permutations, config)
    }

    /// Build over every signature in a finalized engine.
    ///
    /// Keys are sorted first so ids do not depend on hash map iteration order.
    pub fn from_engine(engine: &SimHashEngine, config: &IndexConfig) -> Result<Self> {
        let mut keys: Vec<&str> = engine.keys().collect();
        keys.sort_unstable();
        let entries = keys
            .into_iter()
            .map(|key| {
                engine
                    .bits(key)
                    .map(|bits| (key, bits))
                    .ok_or_else(|| PlebError::UnknownKey(key.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::build(entries, config)
    }

    fn assemble(
        keys: Vec<String>,
        num_bytes: usize,
        table: Vec<u8>,
        permutations: Vec<Vec<u32>>,
        config: &IndexConfig,
    ) -> Result<Self> {
        for perm in &permutations {
            if perm.len() != num_bytes {
                return Err(PlebError::DimensionMismatch {
                    expected: num_bytes,
                    actual: perm.len(),
                });
            }
            if !is_permutation(perm, num_bytes) {
                return Err(PlebError::InvalidParameter(
                    "permutation table is not a permutation of byte positions".to_string(),
                ));
            }
        }

        let start = Instant::now();
        let ids = id_map(&keys)?;
        let order = config.order;

        #[cfg(feature = "parallel")]
        let orderings: Vec<Vec<u32>> = permutations
            .par_iter()
            .map(|perm| sort_ordering(&table, num_bytes, perm, order))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let orderings: Vec<Vec<u32>> = permutations
            .iter()
            .map(|perm| sort_ordering(&table, num_bytes, perm, order))
            .collect();

        info!(
            keys = keys.len(),
            permutations = permutations.len(),
            order = ?order,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "permutation index built"
        );

        Ok(Self {
            keys,
            ids,
            num_bytes,
            order,
            permutations,
            orderings,
            signatures: Some(table),
            query: config.query,
        })
    }

    /// Reassemble a persisted index without signature bytes. Validates structure.
    pub(crate) fn from_parts(
        keys: Vec<String>,
        num_bytes: usize,
        order: SortOrder,
        permutations: Vec<Vec<u32>>,
        orderings: Vec<Vec<u32>>,
    ) -> Result<Self> {
        if keys.is_empty() {
            return Err(PlebError::EmptyIndex);
        }
        if permutations.len() != orderings.len() || permutations.is_empty() {
            return Err(PlebError::InvalidParameter(format!(
                "{} permutation tables for {} orderings",
                permutations.len(),
                orderings.len()
            )));
        }
        for perm in &permutations {
            if !is_permutation(perm, num_bytes) {
                return Err(PlebError::DimensionMismatch {
                    expected: num_bytes,
                    actual: perm.len(),
                });
            }
        }
        for ordering in &orderings {
            if !is_permutation(ordering, keys.len()) {
                return Err(PlebError::InvalidParameter(
                    "ordering is not a permutation of ids".to_string(),
                ));
            }
        }
        let ids = id_map(&keys)?;
        Ok(Self {
            keys,
            ids,
            num_bytes,
            order,
            permutations,
            orderings,
            signatures: None,
            query: QueryParams::default(),
        })
    }

    /// Re-attach signature bytes from `engine`, matching by key.
    ///
    /// Every indexed key must have a built signature of the indexed length; engine keys that
    /// are not indexed are ignored. Signatures that changed since the index was built break
    /// the stored orderings and are rejected with [`PlebError::StaleOrdering`]; the index stays
    /// unaligned.
    pub fn realign(&mut self, engine: &SimHashEngine) -> Result<()> {
        if engine.num_bits() != self.num_bytes * 8 {
            return Err(PlebError::DimensionMismatch {
                expected: self.num_bytes,
                actual: engine.num_bits() / 8,
            });
        }
        let mut table = Vec::with_capacity(self.keys.len() * self.num_bytes);
        for key in &self.keys {
            let bits = engine
                .bits(key)
                .ok_or_else(|| PlebError::UnknownKey(key.clone()))?;
            if bits.len() != self.num_bytes {
                return Err(PlebError::DimensionMismatch {
                    expected: self.num_bytes,
                    actual: bits.len(),
                });
            }
            table.extend_from_slice(bits);
        }
        for (p, (perm, ordering)) in self.permutations.iter().zip(&self.orderings).enumerate() {
            if !is_sorted_under(&table, self.num_bytes, perm, self.order, ordering) {
                return Err(PlebError::StaleOrdering { permutation: p });
            }
        }
        debug!(
            indexed = self.keys.len(),
            ignored = engine.len().saturating_sub(self.keys.len()),
            "index realigned with engine signatures"
        );
        self.signatures = Some(table);
        Ok(())
    }

    /// Approximate top-`k` neighbours of an indexed key, best first.
    ///
    /// The key itself is a candidate and scores 1.0. Unknown keys give an empty result.
    /// Each of the first `min(P, max_permutations)` orderings contributes the `beam_width`
    /// ids around the key's position; a candidate seen in several orderings is reported once.
    /// Order among equal scores is unspecified.
    pub fn kbest(
        &self,
        key: &str,
        k: usize,
        beam_width: usize,
        max_permutations: usize,
    ) -> Result<Vec<Neighbor>> {
        let table = self.table()?;
        let Some(&id) = self.ids.get(key) else {
            return Ok(Vec::new());
        };
        let top = self.probe(table, self.row(table, id), Some(id), k, beam_width, max_permutations);
        Ok(self.neighbors(top))
    }

    /// Approximate top-`k` neighbours of an arbitrary signature of the indexed length.
    pub fn kbest_signature(
        &self,
        signature: &[u8],
        k: usize,
        beam_width: usize,
        max_permutations: usize,
    ) -> Result<Vec<Neighbor>> {
        let table = self.table()?;
        if signature.len() != self.num_bytes {
            return Err(PlebError::DimensionMismatch {
                expected: self.num_bytes,
                actual: signature.len(),
            });
        }
        let top = self.probe(table, signature, None, k, beam_width, max_permutations);
        Ok(self.neighbors(top))
    }

    /// Approximate k-NN edge list over every indexed key, grouped by source id.
    ///
    /// Self edges are dropped, so each source has at most `k` edges.
    pub fn kbest_graph(
        &self,
        k: usize,
        beam_width: usize,
        max_permutations: usize,
    ) -> Result<Vec<Edge>> {
        let table = self.table()?;
        let edges_for = |source: u32| -> Vec<Edge> {
            let top = self.probe(
                table,
                self.row(table, source),
                Some(source),
                k.saturating_add(1),
                beam_width,
                max_permutations,
            );
            top.into_sorted_vec()
                .into_iter()
                .filter(|&(target, _)| target != source)
                .take(k)
                .map(|(target, score)| Edge {
                    source,
                    target,
                    score,
                })
                .collect()
        };

        let n = self.keys.len() as u32;
        #[cfg(feature = "parallel")]
        let per_source: Vec<Vec<Edge>> = (0..n).into_par_iter().map(edges_for).collect();
        #[cfg(not(feature = "parallel"))]
        let per_source: Vec<Vec<Edge>> = (0..n).map(edges_for).collect();

        Ok(per_source.into_iter().flatten().collect())
    }

    fn probe(
        &self,
        table: &[u8],
        query: &[u8],
        query_id: Option<u32>,
        k: usize,
        beam_width: usize,
        max_permutations: usize,
    ) -> BoundedTopK<u32> {
        let mut top = BoundedTopK::with_duplicates(k, Direction::Max, Duplicates::Forbid);
        if k == 0 || beam_width == 0 {
            return top;
        }
        let probes = self.orderings.len().min(max_permutations);
        for (perm, ordering) in self.permutations.iter().zip(&self.orderings).take(probes) {
            let cmp = PermutedOrder::new(perm, self.order);
            let pos = ordering.partition_point(|&other| {
                let ord = cmp.compare(self.row(table, other), query);
                match query_id {
                    Some(id) => ord.then(other.cmp(&id)) == Ordering::Less,
                    None => ord == Ordering::Less,
                }
            });
            for &candidate in &ordering[window(ordering.len(), pos, beam_width)] {
                if top.contains(&candidate) {
                    continue;
                }
                let score = approximate_cosine(self.row(table, candidate), query);
                top.insert(candidate, score);
            }
        }
        top
    }

    fn neighbors(&self, top: BoundedTopK<u32>) -> Vec<Neighbor> {
        top.into_sorted_vec()
            .into_iter()
            .map(|(id, score)| Neighbor {
                id,
                key: self.keys[id as usize].clone(),
                score,
            })
            .collect()
    }

    fn table(&self) -> Result<&[u8]> {
        self.signatures.as_deref().ok_or(PlebError::NotAligned)
    }

    #[inline]
    fn row<'t>(&self, table: &'t [u8], id: u32) -> &'t [u8] {
        let start = id as usize * self.num_bytes;
        &table[start..start + self.num_bytes]
    }

    /// Whether signature bytes are attached (queries are possible).
    pub fn is_aligned(&self) -> bool {
        self.signatures.is_some()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn key(&self, id: u32) -> Option<&str> {
        self.keys.get(id as usize).map(String::as_str)
    }

    pub fn id(&self, key: &str) -> Option<u32> {
        self.ids.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.ids.contains_key(key)
    }

    /// Signature bytes for an indexed key, if aligned.
    pub fn signature(&self, key: &str) -> Option<&[u8]> {
        let table = self.signatures.as_deref()?;
        let id = self.id(key)?;
        Some(self.row(table, id))
    }

    pub fn num_bytes(&self) -> usize {
        self.num_bytes
    }

    pub fn num_permutations(&self) -> usize {
        self.permutations.len()
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    pub fn permutations(&self) -> &[Vec<u32>] {
        &self.permutations
    }

    pub fn orderings(&self) -> &[Vec<u32>] {
        &self.orderings
    }

    pub fn query_params(&self) -> QueryParams {
        self.query
    }

    pub fn set_query_params(&mut self, query: QueryParams) {
        self.query = query;
    }
}

/// Flatten entries into keys and an id-major byte table, checking lengths.
fn collect_entries<K, S, I>(entries: I) -> Result<(Vec<String>, usize, Vec<u8>)>
where
    K: Into<String>,
    S: AsRef<[u8]>,
    I: IntoIterator<Item = (K, S)>,
{
    let mut keys = Vec::new();
    let mut table = Vec::new();
    let mut num_bytes = None;
    for (key, bits) in entries {
        let bits = bits.as_ref();
        let expected = *num_bytes.get_or_insert(bits.len());
        if bits.len() != expected {
            return Err(PlebError::DimensionMismatch {
                expected,
                actual: bits.len(),
            });
        }
        keys.push(key.into());
        table.extend_from_slice(bits);
    }
    let num_bytes = match num_bytes {
        None => return Err(PlebError::EmptyIndex),
        Some(0) => {
            return Err(PlebError::InvalidParameter(
                "signatures must be non-empty".to_string(),
            ))
        }
        Some(n) => n,
    };
    if keys.len() > u32::MAX as usize {
        return Err(PlebError::InvalidParameter(format!(
            "{} keys exceed the u32 id space",
            keys.len()
        )));
    }
    Ok((keys, num_bytes, table))
}

fn id_map(keys: &[String]) -> Result<HashMap<String, u32>> {
    let mut ids = HashMap::with_capacity(keys.len());
    for (id, key) in keys.iter().enumerate() {
        if ids.insert(key.clone(), id as u32).is_some() {
            return Err(PlebError::DuplicateKey(key.clone()));
        }
    }
    Ok(ids)
}

/// Sort all ids under one permutation; ties broken by id so the order is total.
fn sort_ordering(table: &[u8], num_bytes: usize, perm: &[u32], order: SortOrder) -> Vec<u32> {
    let cmp = PermutedOrder::new(perm, order);
    let row = |id: u32| {
        let start = id as usize * num_bytes;
        &table[start..start + num_bytes]
    };
    let n = (table.len() / num_bytes) as u32;
    let mut ids: Vec<u32> = (0..n).collect();
    ids.sort_unstable_by(|&a, &b| cmp.compare(row(a), row(b)).then(a.cmp(&b)));
    ids
}

/// Whether `ordering` is sorted under `perm`, ties by id.
fn is_sorted_under(
    table: &[u8],
    num_bytes: usize,
    perm: &[u32],
    order: SortOrder,
    ordering: &[u32],
) -> bool {
    let cmp = PermutedOrder::new(perm, order);
    let row = |id: u32| {
        let start = id as usize * num_bytes;
        &table[start..start + num_bytes]
    };
    ordering
        .windows(2)
        .all(|w| cmp.compare(row(w[0]), row(w[1])).then(w[0].cmp(&w[1])) == Ordering::Less)
}

/// `beam` consecutive positions centred on `pos`, shifted to stay inside `0..len`.
fn window(len: usize, pos: usize, beam: usize) -> Range<usize> {
    let beam = beam.min(len);
    let start = pos.saturating_sub(beam / 2).min(len - beam);
    start..start + beam
}
