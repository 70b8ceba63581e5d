//! Insert and search throughput across backend modes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use omendb_core::{IndexConfig, OmenIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect()
}

fn build_index(vectors: &[Vec<f32>], dim: usize) -> OmenIndex {
    let mut index = OmenIndex::new();
    index.init(dim).unwrap();
    for (i, v) in vectors.iter().enumerate() {
        index.insert(&format!("v{i}"), v).unwrap();
    }
    index
}

fn bench_search(c: &mut Criterion) {
    let dim = 128;
    let mut group = c.benchmark_group("search");

    for &n in &[400usize, 5_000] {
        let vectors = random_vectors(n, dim, 7);
        let index = build_index(&vectors, dim);
        let query = random_vectors(1, dim, 99).remove(0);

        group.bench_with_input(BenchmarkId::new("top10", n), &n, |b, _| {
            b.iter(|| black_box(index.search(black_box(&query), 10).unwrap()));
        });
    }
    group.finish();
}

fn bench_insert(c: &mut Criterion) {
    let dim = 128;
    let vectors = random_vectors(2_000, dim, 3);

    c.bench_function("insert_2k_graph", |b| {
        b.iter(|| {
            let mut index = OmenIndex::new();
            index
                .init_with(
                    dim,
                    omendb_core::DistanceMetric::Euclidean,
                    IndexConfig {
                        flat_threshold: 100,
                        ..IndexConfig::default()
                    },
                )
                .unwrap();
            for (i, v) in vectors.iter().enumerate() {
                index.insert(&format!("v{i}"), v).unwrap();
            }
            black_box(index.count())
        });
    });
}

criterion_group!(benches, bench_search, bench_insert);
criterion_main!(benches);
