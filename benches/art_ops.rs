//! Benchmarks for tree operations against BTreeMap.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use artkv::{ArtTree, NodeArena};
use std::collections::BTreeMap;

fn generate_sequential_keys(n: usize) -> Vec<Vec<u8>> {
    (0..n).map(|i| format!("key:{:08}", i).into_bytes()).collect()
}

fn generate_url_like_keys(n: usize) -> Vec<Vec<u8>> {
    let domains = ["example.com", "test.org", "demo.net", "sample.io"];
    let paths = ["users", "posts", "comments", "api/v1", "api/v2"];

    (0..n)
        .map(|i| {
            let domain = domains[i % domains.len()];
            let path = paths[(i / domains.len()) % paths.len()];
            let id = i / (domains.len() * paths.len());
            format!("{}/{}/{}", domain, path, id).into_bytes()
        })
        .collect()
}

fn build_tree(keys: &[Vec<u8>]) -> (NodeArena<u64>, ArtTree<u64>) {
    let mut arena = NodeArena::new();
    let mut tree = ArtTree::new();
    for (i, key) in keys.iter().enumerate() {
        tree.insert(&mut arena, key, i as u64);
    }
    (arena, tree)
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for size in [1_000, 10_000, 100_000] {
        let keys = generate_sequential_keys(size);

        group.bench_with_input(BenchmarkId::new("ArtTree", size), &keys, |b, keys| {
            b.iter(|| black_box(build_tree(keys)));
        });

        group.bench_with_input(BenchmarkId::new("BTreeMap", size), &keys, |b, keys| {
            b.iter(|| {
                let mut map: BTreeMap<Vec<u8>, u64> = BTreeMap::new();
                for (i, key) in keys.iter().enumerate() {
                    map.insert(key.clone(), i as u64);
                }
                black_box(map)
            });
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    for size in [1_000, 10_000, 100_000] {
        let keys = generate_url_like_keys(size);
        let (arena, tree) = build_tree(&keys);

        let mut btree: BTreeMap<Vec<u8>, u64> = BTreeMap::new();
        for (i, key) in keys.iter().enumerate() {
            btree.insert(key.clone(), i as u64);
        }

        group.bench_with_input(BenchmarkId::new("ArtTree", size), &keys, |b, keys| {
            b.iter(|| {
                let mut sum = 0u64;
                for key in keys.iter() {
                    if let Some(v) = tree.get(&arena, key) {
                        sum += v;
                    }
                }
                black_box(sum)
            });
        });

        group.bench_with_input(BenchmarkId::new("BTreeMap", size), &keys, |b, keys| {
            b.iter(|| {
                let mut sum = 0u64;
                for key in keys.iter() {
                    if let Some(v) = btree.get(key) {
                        sum += v;
                    }
                }
                black_box(sum)
            });
        });
    }

    group.finish();
}

fn bench_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    for size in [10_000, 100_000] {
        let keys = generate_sequential_keys(size);
        let (arena, tree) = build_tree(&keys);

        let mut btree: BTreeMap<Vec<u8>, u64> = BTreeMap::new();
        for (i, key) in keys.iter().enumerate() {
            btree.insert(key.clone(), i as u64);
        }

        group.bench_function(BenchmarkId::new("ArtTree", size), |b| {
            b.iter(|| {
                let mut sum = 0u64;
                for (_, v) in tree.iter(&arena) {
                    sum += v;
                }
                black_box(sum)
            });
        });

        group.bench_function(BenchmarkId::new("BTreeMap", size), |b| {
            b.iter(|| {
                let mut sum = 0u64;
                for (_, v) in btree.iter() {
                    sum += v;
                }
                black_box(sum)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_insert, bench_lookup, bench_iteration);
criterion_main!(benches);
