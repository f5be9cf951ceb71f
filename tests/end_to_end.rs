//! End-to-end tests: stream features into an engine, build an index, query it.

use pleb_lsh::hash::{approximate_cosine, SimHashConfig, SimHashEngine};
use pleb_lsh::pleb::{IndexConfig, NeighborIndex, QueryParams, SortOrder, UNKNOWN};
use pleb_lsh::PlebError;
use rand::prelude::*;

fn engine(bits: usize, seed: u64) -> SimHashEngine {
    SimHashEngine::new(SimHashConfig::new(bits).with_pool_size(10_000).with_seed(seed))
        .expect("valid config")
}

fn random_signatures(n: usize, num_bytes: usize, seed: u64) -> Vec<(String, Vec<u8>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let mut bytes = vec![0u8; num_bytes];
            rng.fill(bytes.as_mut_slice());
            (format!("k{i}"), bytes)
        })
        .collect()
}

// =============================================================================
// Engine
// =============================================================================

#[test]
fn identical_streams_score_one_disjoint_streams_lower() {
    let mut e = engine(64, 11);
    for key in ["A", "B"] {
        e.update(key, "x", 1.0).unwrap();
        e.update(key, "y", 1.0).unwrap();
    }
    e.update("C", "z", 1.0).unwrap();
    e.finalize();

    let ab = e.score("A", "B").unwrap();
    let ac = e.score("A", "C").unwrap();
    assert_eq!(ab, 1.0);
    assert!(ab > ac, "A~B {ab} should beat A~C {ac}");
    assert_eq!(e.score("A", "nope"), None);
    assert_eq!(e.strength("A"), Some(2));
}

#[test]
fn update_order_within_a_key_does_not_change_sign_pattern_for_exact_sums() {
    // Integer-valued weights times the same pool values: both orders accumulate the same
    // two terms, and addition of two floats commutes.
    let mut e = engine(128, 3);
    e.update("fwd", "left", 2.0).unwrap();
    e.update("fwd", "right", 1.0).unwrap();
    e.update("rev", "right", 1.0).unwrap();
    e.update("rev", "left", 2.0).unwrap();
    e.finalize();
    assert_eq!(e.bits("fwd"), e.bits("rev"));
}

#[test]
fn scores_track_feature_overlap() {
    // Three partners sharing 90, 50 and 10 of 100 unit features with the anchor.
    let mut high = 0.0;
    let mut mid = 0.0;
    let mut low = 0.0;
    let seeds = [1u64, 2, 3, 4, 5];
    for &seed in &seeds {
        let mut e = engine(256, seed);
        for f in 0..100 {
            e.update("anchor", &format!("f{f}"), 1.0).unwrap();
        }
        for (key, shared) in [("high", 90), ("mid", 50), ("low", 10)] {
            for f in 0..shared {
                e.update(key, &format!("f{f}"), 1.0).unwrap();
            }
            for f in shared..100 {
                e.update(key, &format!("{key}-{f}"), 1.0).unwrap();
            }
        }
        e.finalize();
        high += e.score("anchor", "high").unwrap();
        mid += e.score("anchor", "mid").unwrap();
        low += e.score("anchor", "low").unwrap();
    }
    let n = seeds.len() as f64;
    let (high, mid, low) = (high / n, mid / n, low / n);
    assert!(high > mid && mid > low, "high={high} mid={mid} low={low}");
    assert!((high - 0.9).abs() < 0.15, "high={high}");
    assert!((low - 0.1).abs() < 0.2, "low={low}");
}

#[test]
fn same_seed_is_deterministic() {
    let run = || {
        let mut e = engine(128, 99);
        for i in 0..50 {
            e.update(&format!("k{}", i % 7), &i, (i % 5) as f64 - 2.0).unwrap();
        }
        e.finalize();
        let mut out: Vec<(String, Vec<u8>)> = e
            .signatures()
            .map(|(k, s)| (k.to_string(), s.bits().unwrap().to_vec()))
            .collect();
        out.sort();
        out
    };
    assert_eq!(run(), run());
}

#[test]
fn finalized_engine_rejects_updates_unless_sums_are_kept() {
    let mut frozen = engine(64, 5);
    frozen.update("k", "a", 1.0).unwrap();
    frozen.finalize();
    assert!(matches!(
        frozen.update("k", "b", 1.0),
        Err(PlebError::Frozen(_))
    ));
    // New keys still accumulate.
    assert!(frozen.update("fresh", "b", 1.0).unwrap());

    let mut resumable = SimHashEngine::new(
        SimHashConfig::new(64)
            .with_pool_size(1_000)
            .with_seed(5)
            .with_keep_sums(true),
    )
    .unwrap();
    resumable.update("k", "a", 1.0).unwrap();
    resumable.finalize();
    resumable.update("k", "b", 1.0).unwrap();
    assert!(resumable.bits("k").is_none(), "update invalidates packed bits");
    resumable.finalize();
    assert_eq!(resumable.strength("k"), Some(2));
}

#[test]
fn filter_limits_new_keys() {
    let mut e = engine(64, 8);
    e.set_filter(["keep"]);
    assert!(e.update("keep", "f", 1.0).unwrap());
    assert!(!e.update("drop", "f", 1.0).unwrap());
    assert!(e.contains("keep"));
    assert!(!e.contains("drop"));
}

// =============================================================================
// Index
// =============================================================================

#[test]
fn every_key_finds_itself_among_ten_thousand() {
    let entries = random_signatures(10_000, 32, 42);
    let index = NeighborIndex::build(entries.clone(), &IndexConfig::new(4)).unwrap();

    for (key, _) in entries.iter().step_by(97) {
        let hits = index.kbest(key, 1, 50, 4).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(&hits[0].key, key);
        assert_eq!(hits[0].score, 1.0);
    }
}

#[test]
fn near_duplicates_are_recalled() {
    // Each base signature gets a twin with two flipped bits; the twin should be the best
    // non-self neighbour.
    let mut rng = StdRng::seed_from_u64(7);
    let base = random_signatures(2_000, 32, 8);
    let mut entries = base.clone();
    for (key, bytes) in &base {
        let mut twin = bytes.clone();
        for _ in 0..2 {
            let bit = rng.random_range(0..256);
            twin[bit / 8] ^= 0x80 >> (bit % 8);
        }
        entries.push((format!("{key}-twin"), twin));
    }

    for order in [SortOrder::Lexicographic, SortOrder::Gray] {
        let index =
            NeighborIndex::build(entries.clone(), &IndexConfig::new(8).with_order(order)).unwrap();
        let mut found = 0;
        for (key, _) in base.iter().take(200) {
            let hits = index.kbest(key, 2, 20, 8).unwrap();
            if hits.iter().any(|h| h.key == format!("{key}-twin")) {
                found += 1;
            }
        }
        assert!(found >= 190, "{order:?}: recalled {found}/200 twins");
    }
}

#[test]
fn engine_to_index_to_protocol() {
    let mut e = engine(64, 21);
    for key in ["A", "B"] {
        e.update_features(key, [("x", 1.0), ("y", 1.0)]).unwrap();
    }
    e.update("C", "z", 1.0).unwrap();
    e.finalize();

    let mut index = NeighborIndex::from_engine(&e, &IndexConfig::new(4)).unwrap();
    assert_eq!(index.keys(), ["A", "B", "C"]);

    let hits = index.kbest("A", 3, 10, 4).unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits[..2].iter().all(|h| h.score == 1.0));
    assert_eq!(hits[2].key, "C");
    assert_eq!(hits[2].score, e.score("A", "C").unwrap());

    index.set_query_params(QueryParams {
        k: 2,
        ..QueryParams::default()
    });
    let line = index.answer("A").unwrap();
    let fields: Vec<&str> = line.split('\t').collect();
    assert_eq!(fields.len(), 4);
    assert!(fields.contains(&"A") && fields.contains(&"B"));
    assert_eq!(fields[1], "1.000000");
    assert_eq!(index.answer("missing 3").unwrap(), UNKNOWN);
    assert!(index.answer("A notanumber").is_err());
}

#[test]
fn graph_edges_point_to_the_closest_key() {
    let entries = vec![
        ("a", vec![0x00u8, 0x00]),
        ("a2", vec![0x00u8, 0x01]),
        ("b", vec![0xFFu8, 0xFF]),
        ("b2", vec![0xFFu8, 0xFE]),
    ];
    let index = NeighborIndex::build(entries, &IndexConfig::new(2)).unwrap();
    let edges = index.kbest_graph(1, 4, 2).unwrap();
    assert_eq!(edges.len(), 4);
    for edge in &edges {
        assert_ne!(edge.source, edge.target);
        let (s, t) = (index.key(edge.source).unwrap(), index.key(edge.target).unwrap());
        assert_eq!(s.chars().next(), t.chars().next(), "{s} -> {t}");
        assert_eq!(
            edge.score,
            approximate_cosine(
                index.signature(s).unwrap(),
                index.signature(t).unwrap()
            )
        );
    }
}

#[test]
fn arbitrary_signature_queries() {
    let entries = random_signatures(500, 16, 5);
    let index = NeighborIndex::build(entries.clone(), &IndexConfig::new(6)).unwrap();
    let probe = entries[123].1.clone();
    let hits = index.kbest_signature(&probe, 3, 30, 6).unwrap();
    assert_eq!(hits[0].key, entries[123].0);
    assert!(matches!(
        index.kbest_signature(&probe[..8], 3, 30, 6),
        Err(PlebError::DimensionMismatch { .. })
    ));
}

#[test]
fn build_rejects_bad_input() {
    let empty: Vec<(String, Vec<u8>)> = Vec::new();
    assert!(matches!(
        NeighborIndex::build(empty, &IndexConfig::new(2)),
        Err(PlebError::EmptyIndex)
    ));
    assert!(matches!(
        NeighborIndex::build(vec![("a", vec![1u8]), ("a", vec![2u8])], &IndexConfig::new(2)),
        Err(PlebError::DuplicateKey(_))
    ));
    assert!(matches!(
        NeighborIndex::build(vec![("a", vec![1u8]), ("b", vec![2u8, 3])], &IndexConfig::new(2)),
        Err(PlebError::DimensionMismatch { .. })
    ));
    assert!(NeighborIndex::build(vec![("a", vec![1u8])], &IndexConfig::new(0)).is_err());
}
