//! Benchmarks for the Strata temporal store
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::collections::HashMap;
use std::sync::Arc;
use strata::{JsonPropertyIndexer, Order, TemporalStore};

const KS: &str = "bench";

fn populated_store(keys: usize, versions: u64) -> TemporalStore {
    let store = TemporalStore::default();
    for version in 0..versions {
        let mut batch = HashMap::new();
        for key in 0..keys {
            batch.insert(
                format!("key_{:05}", key),
                Some(format!(r#"{{"name": "user_{}_{}"}}"#, key, version).into_bytes()),
            );
        }
        store.put("master", KS, (version + 1) * 10, batch).unwrap();
    }
    store
}

fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");

    for size in [100, 1000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("batch_{}", size), |b| {
            b.iter_with_setup(TemporalStore::default, |store| {
                let mut batch = HashMap::new();
                for key in 0..size {
                    batch.insert(
                        format!("key_{:05}", key),
                        Some(format!(r#"{{"name": "user_{}"}}"#, key).into_bytes()),
                    );
                }
                store.put("master", KS, 10, black_box(batch)).unwrap();
            })
        });
    }

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    let store = populated_store(1000, 10);

    group.bench_function("point_lookup", |b| {
        b.iter(|| {
            store
                .get("master", KS, black_box(55), black_box("key_00500"))
                .unwrap()
        })
    });

    group.bench_function("history", |b| {
        b.iter(|| {
            store
                .history("master", KS, black_box("key_00500"), 0, 200, Order::Ascending)
                .unwrap()
        })
    });

    group.finish();
}

fn bench_index_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_scan");

    let store = populated_store(1000, 5);
    store
        .create_index("master", "name", Arc::new(JsonPropertyIndexer::string("name")))
        .unwrap();
    store.reindex(false).unwrap();

    group.throughput(Throughput::Elements(1000));
    group.bench_function("full_scan_1000", |b| {
        b.iter(|| {
            store
                .index_scan("master", KS, "name", black_box(100), Order::Ascending, None)
                .unwrap()
        })
    });

    // scan through a branch that delegates to its parent
    store.create_branch("master", "branch", 50).unwrap();
    store
        .create_index("branch", "name", Arc::new(JsonPropertyIndexer::string("name")))
        .unwrap();
    store.reindex(false).unwrap();

    group.bench_function("branch_delta_scan_1000", |b| {
        b.iter(|| {
            store
                .index_scan("branch", KS, "name", black_box(100), Order::Ascending, None)
                .unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_put, bench_get, bench_index_scan);
criterion_main!(benches);
