//! One-line text query protocol.
//!
//! A request is a key optionally followed by `k`, `beam_width` and `max_permutations`,
//! separated by whitespace. Omitted values fall back to the index's [`QueryParams`]. The
//! response is one line of tab-separated `neighbor<TAB>score` pairs, or [`UNKNOWN`] when the
//! key is not indexed. Keys containing whitespace cannot be expressed in this format.
//!
//! ```text
//! > doc-17 5 100
//! < doc-17	1.000000	doc-4	0.923880	doc-91	0.881921 ...
//! > missing-key
//! < UNKNOWN
//! ```
//!
//! Sockets, framing and batching belong to the serving layer, not here.

use crate::error::{PlebError, Result};
use crate::pleb::index::{Neighbor, NeighborIndex, QueryParams};

/// Response token for keys that are not in the index.
pub const UNKNOWN: &str = "UNKNOWN";

/// Parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub key: String,
    pub k: Option<usize>,
    pub beam_width: Option<usize>,
    pub max_permutations: Option<usize>,
}

impl QueryRequest {
    pub fn parse(line: &str) -> Result<Self> {
        let mut fields = line.split_whitespace();
        let key = fields
            .next()
            .ok_or_else(|| PlebError::InvalidParameter("empty query line".to_string()))?
            .to_string();
        let mut numbers = [None; 3];
        for (slot, name) in numbers
            .iter_mut()
            .zip(["k", "beam_width", "max_permutations"])
        {
            if let Some(field) = fields.next() {
                let value = field.parse::<usize>().map_err(|_| {
                    PlebError::InvalidParameter(format!("{name} must be an integer, got {field:?}"))
                })?;
                *slot = Some(value);
            }
        }
        if let Some(extra) = fields.next() {
            return Err(PlebError::InvalidParameter(format!(
                "unexpected trailing field {extra:?}"
            )));
        }
        let [k, beam_width, max_permutations] = numbers;
        Ok(Self {
            key,
            k,
            beam_width,
            max_permutations,
        })
    }

    /// Fill omitted fields from `defaults`.
    pub fn resolve(&self, defaults: QueryParams) -> QueryParams {
        QueryParams {
            k: self.k.unwrap_or(defaults.k),
            beam_width: self.beam_width.unwrap_or(defaults.beam_width),
            max_permutations: self.max_permutations.unwrap_or(defaults.max_permutations),
        }
    }
}

/// Tab-separated `key<TAB>score` pairs on one line.
pub fn format_neighbors(neighbors: &[Neighbor]) -> String {
    neighbors
        .iter()
        .map(|n| format!("{}\t{:.6}", n.key, n.score))
        .collect::<Vec<_>>()
        .join("\t")
}

impl NeighborIndex {
    /// Answer one protocol line.
    pub fn answer(&self, line: &str) -> Result<String> {
        let request = QueryRequest::parse(line)?;
        if !self.contains(&request.key) {
            return Ok(UNKNOWN.to_string());
        }
        let params = request.resolve(self.query_params());
        let neighbors = self.kbest(
            &request.key,
            params.k,
            params.beam_width,
            params.max_permutations,
        )?;
        Ok(format_neighbors(&neighbors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pleb::index::IndexConfig;

    #[test]
    fn parses_optional_overrides() {
        let r = QueryRequest::parse("  doc-1  5 80 ").unwrap();
        assert_eq!(r.key, "doc-1");
        assert_eq!(r.k, Some(5));
        assert_eq!(r.beam_width, Some(80));
        assert_eq!(r.max_permutations, None);

        let params = r.resolve(QueryParams::default());
        assert_eq!(params.k, 5);
        assert_eq!(params.beam_width, 80);
        assert_eq!(params.max_permutations, usize::MAX);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(QueryRequest::parse("").is_err());
        assert!(QueryRequest::parse("key five").is_err());
        assert!(QueryRequest::parse("key 1 2 3 4").is_err());
    }

    #[test]
    fn answers_known_and_unknown_keys() {
        let entries = vec![
            ("a", vec![0b1111_0000u8]),
            ("b", vec![0b1111_0001u8]),
            ("c", vec![0b0000_1111u8]),
        ];
        let index = NeighborIndex::build(entries, &IndexConfig::new(1)).unwrap();

        assert_eq!(index.answer("zzz").unwrap(), UNKNOWN);

        let line = index.answer("a 2 3").unwrap();
        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0], "a");
        assert_eq!(fields[1], "1.000000");
        assert_eq!(fields[2], "b");
    }
}
