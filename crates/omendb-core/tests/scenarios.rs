//! End-to-end scenarios exercising the full facade: adaptive mode
//! transitions, persistence round-trips, and failure semantics.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use omendb_core::{DistanceMetric, IndexConfig, IndexMode, OmenIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use tempfile::tempdir;

fn random_unit_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let v: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-12);
            v.into_iter().map(|x| x / norm).collect()
        })
        .collect()
}

#[test]
fn scenario_axis_vectors_rank_correctly() {
    let mut index = OmenIndex::new();
    index.init(4).unwrap();
    index.insert("a", &[1.0, 0.0, 0.0, 0.0]).unwrap();
    index.insert("b", &[0.0, 1.0, 0.0, 0.0]).unwrap();
    index.insert("c", &[0.0, 0.0, 1.0, 0.0]).unwrap();

    let hits = index.search(&[1.0, 0.1, 0.0, 0.0], 2).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].0, "a");
    assert!(hits[0].1 < 0.15);
    assert_eq!(hits[1].0, "b");
    assert!(hits[1].1 > 0.9);
}

#[test]
fn scenario_checkpoint_clear_recover_self_search() {
    let dim = 8;
    let n = 1_000;
    let vectors = random_unit_vectors(n, dim, 0xC0FFEE);

    let mut index = OmenIndex::new();
    index.init(dim).unwrap();
    for (i, v) in vectors.iter().enumerate() {
        index.insert(&format!("v{i}"), v).unwrap();
    }
    assert_eq!(index.count(), n as u64);

    let dir = tempdir().unwrap();
    let base = dir.path().join("x");
    let written = index.checkpoint(&base).unwrap();
    assert_eq!(written, n as u64);

    index.clear().unwrap();
    assert_eq!(index.count(), 0);

    let recovered = index.recover(&base).unwrap();
    assert_eq!(recovered, n as u64);
    assert_eq!(index.count(), n as u64);

    for (i, v) in vectors.iter().enumerate() {
        let hits = index.search(v, 1).unwrap();
        assert_eq!(hits[0].0, format!("v{i}"), "self-search after recover");
    }
}

#[test]
fn scenario_bulk_load_goes_segmented_with_good_recall() {
    let dim = 16;
    let n = 10_000;
    let vectors = random_unit_vectors(n + 1, dim, 0xBEEF);
    let query = &vectors[n];

    let mut index = OmenIndex::new();
    index.init(dim).unwrap();

    let ids: Vec<String> = (0..n).map(|i| format!("v{i}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let flat: Vec<f32> = vectors[..n].iter().flatten().copied().collect();

    let ok = index.insert_batch(&id_refs, &flat).unwrap();
    assert!(ok.iter().all(|&b| b));
    assert_eq!(index.count(), n as u64);
    assert_eq!(index.stats().unwrap().mode, IndexMode::Segmented);

    // Exact top-10 for the held-out query.
    let mut exact: Vec<(usize, f32)> = vectors[..n]
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let d = v
                .iter()
                .zip(query)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f32>()
                .sqrt();
            (i, d)
        })
        .collect();
    exact.sort_by(|a, b| a.1.total_cmp(&b.1));
    let expected: HashSet<String> = exact[..10].iter().map(|&(i, _)| format!("v{i}")).collect();

    let hits = index.search_with_ef(query, 10, 128).unwrap();
    let got: HashSet<String> = hits.into_iter().map(|(sid, _)| sid).collect();
    let overlap = expected.intersection(&got).count();
    assert!(overlap >= 9, "recall@10 = {}", overlap as f64 / 10.0);
}

#[test]
fn scenario_nan_insert_is_rejected() {
    let mut index = OmenIndex::new();
    index.init(4).unwrap();
    let err = index.insert("a", &[f32::NAN, 0.0, 0.0, 0.0]).unwrap_err();
    assert_eq!(err.code(), "OMEN-004");
    assert_eq!(index.count(), 0);
}

#[test]
fn scenario_duplicate_id_keeps_original() {
    let mut index = OmenIndex::new();
    index.init(4).unwrap();
    index.insert("a", &[1.0, 0.0, 0.0, 0.0]).unwrap();
    let err = index.insert("a", &[0.0, 1.0, 0.0, 0.0]).unwrap_err();
    assert_eq!(err.code(), "OMEN-005");

    let hits = index.search(&[1.0, 0.0, 0.0, 0.0], 1).unwrap();
    assert_eq!(hits[0].0, "a");
    assert!(hits[0].1 < 1e-6);
}

#[test]
fn scenario_threshold_crossing_keeps_everything_searchable() {
    let dim = 32;
    let n = 600;
    let vectors = random_unit_vectors(n, dim, 0xDEAD);

    let mut index = OmenIndex::new();
    index.init(dim).unwrap();
    for (i, v) in vectors.iter().enumerate() {
        index.insert(&format!("v{i}"), v).unwrap();
        if i < 500 {
            assert_eq!(index.stats().unwrap().mode, IndexMode::Flat);
        }
    }
    assert_eq!(index.stats().unwrap().mode, IndexMode::Graph);
    assert_eq!(index.count(), n as u64);

    for (i, v) in vectors.iter().enumerate() {
        let hits = index.search(v, 1).unwrap();
        assert_eq!(hits[0].0, format!("v{i}"), "post-migration self-query");
        assert!(hits[0].1 < 1e-5);
    }
}

#[test]
fn round_trip_preserves_vector_bytes() {
    let dim = 6;
    let vectors = random_unit_vectors(64, dim, 0xF00D);

    let mut index = OmenIndex::new();
    index.init(dim).unwrap();
    for (i, v) in vectors.iter().enumerate() {
        index.insert(&format!("v{i}"), v).unwrap();
    }

    let dir = tempdir().unwrap();
    let base = dir.path().join("bits");
    index.checkpoint(&base).unwrap();
    index.clear().unwrap();
    index.recover(&base).unwrap();

    for (i, v) in vectors.iter().enumerate() {
        let got = index.get(&format!("v{i}")).unwrap();
        for (a, b) in v.iter().zip(&got) {
            assert_eq!(a.to_bits(), b.to_bits(), "vector v{i} not bit-exact");
        }
    }
}

#[test]
fn checkpoint_compacts_tombstones() {
    let mut index = OmenIndex::new();
    index.init(4).unwrap();
    for i in 0..20 {
        index
            .insert(&format!("v{i}"), &[i as f32, 1.0, 2.0, 3.0])
            .unwrap();
    }
    for i in (0..20).step_by(2) {
        index.delete(&format!("v{i}")).unwrap();
    }
    assert_eq!(index.count(), 10);
    assert_eq!(index.stats().unwrap().tombstones, 10);

    let dir = tempdir().unwrap();
    let base = dir.path().join("compact");
    assert_eq!(index.checkpoint(&base).unwrap(), 10);

    index.clear().unwrap();
    assert_eq!(index.recover(&base).unwrap(), 10);
    assert_eq!(index.stats().unwrap().tombstones, 0);
    for i in 0..20 {
        assert_eq!(index.contains(&format!("v{i}")), i % 2 == 1);
    }
}

#[test]
fn repeated_checkpoints_recover_latest_state() {
    let mut index = OmenIndex::new();
    index.init(2).unwrap();
    index.insert("a", &[1.0, 0.0]).unwrap();

    let dir = tempdir().unwrap();
    let base = dir.path().join("multi");
    index.checkpoint(&base).unwrap();

    index.insert("b", &[0.0, 1.0]).unwrap();
    index.delete("a").unwrap();
    index.insert("a", &[0.5, 0.5]).unwrap();
    index.checkpoint(&base).unwrap();

    let mut fresh = OmenIndex::new();
    assert_eq!(fresh.recover(&base).unwrap(), 2);
    let a = fresh.get("a").unwrap();
    assert_eq!(a, vec![0.5, 0.5], "later block must override earlier one");
    assert!(fresh.contains("b"));
}

#[test]
fn recover_missing_file_leaves_state_untouched() {
    let mut index = OmenIndex::new();
    index.init(2).unwrap();
    index.insert("keep", &[1.0, 2.0]).unwrap();

    let dir = tempdir().unwrap();
    let err = index.recover(dir.path().join("nope")).unwrap_err();
    assert_eq!(err.code(), "OMEN-007");

    assert_eq!(index.count(), 1);
    assert!(index.contains("keep"));
}

#[test]
fn recover_works_on_uninitialized_index() {
    let mut source = OmenIndex::new();
    source.init(3).unwrap();
    source.insert("x", &[1.0, 2.0, 3.0]).unwrap();

    let dir = tempdir().unwrap();
    let base = dir.path().join("cold");
    source.checkpoint(&base).unwrap();

    let mut fresh = OmenIndex::new();
    assert_eq!(fresh.recover(&base).unwrap(), 1);
    assert_eq!(fresh.dimension(), Some(3));
    assert_eq!(fresh.get("x").unwrap(), vec![1.0, 2.0, 3.0]);
}

#[test]
fn empty_checkpoint_round_trips() {
    let mut index = OmenIndex::new();
    index.init(4).unwrap();

    let dir = tempdir().unwrap();
    let base = dir.path().join("empty");
    assert_eq!(index.checkpoint(&base).unwrap(), 0);

    index.clear().unwrap();
    assert_eq!(index.recover(&base).unwrap(), 0);
    assert_eq!(index.count(), 0);
    assert_eq!(index.dimension(), Some(4));
}

#[test]
fn binary_quant_config_round_trip() {
    let dim = 16;
    let vectors = random_unit_vectors(700, dim, 0xB1B1);

    let mut index = OmenIndex::new();
    index
        .init_with(
            dim,
            DistanceMetric::Euclidean,
            IndexConfig::default().with_binary_quant(),
        )
        .unwrap();
    for (i, v) in vectors.iter().enumerate() {
        index.insert(&format!("v{i}"), v).unwrap();
    }
    assert_eq!(index.stats().unwrap().mode, IndexMode::Graph);

    for (i, v) in vectors.iter().enumerate().step_by(13) {
        let hits = index.search(v, 1).unwrap();
        assert_eq!(hits[0].0, format!("v{i}"), "self-query with Hamming pre-filter");
    }
}
