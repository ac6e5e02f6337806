//! Record store benchmarks
//!
//! ## Path Types
//!
//! - `memory_*`: RecordStore over the sharded in-memory table
//! - `sqlite_*`: RecordStore over a SQLite file (WAL, synchronous = normal)
//!
//! ## What These Benchmarks Cover
//!
//! | Benchmark | Semantic | Regression Detection |
//! |-----------|----------|----------------------|
//! | */create | version 1 insert incl. existence check | lock + insert cost |
//! | */get_latest | highest version lookup | ordered scan cost |
//! | */get_exact | point read of an old version | key lookup cost |
//! | */update_versioned | resolve + apply + append | full write path |
//! | */update_legacy | resolve + apply + overwrite | overwrite path |
//!
//! ## Running
//!
//! ```bash
//! cargo bench --bench record_store
//! cargo bench --bench record_store -- "memory"
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tempfile::TempDir;
use timetravel::{
    Directives, Fields, MemoryTable, OpContext, RecordId, RecordStore, SqliteConfig, SqliteTable,
    SyncMode, TableLayout, Version, VersionSelector, VersioningMode,
};

/// Number of history rows behind the benchmarked record
const HISTORY_DEPTH: u64 = 100;

fn sample_fields() -> Fields {
    (0..8)
        .map(|i| (format!("field{}", i), format!("value{}", i)))
        .collect()
}

fn id(n: u64) -> RecordId {
    RecordId::new(n).expect("bench ids are positive")
}

fn seeded(store: &RecordStore) {
    let ctx = OpContext::background();
    store.create(&ctx, id(1), sample_fields()).unwrap();
    for n in 1..HISTORY_DEPTH {
        store
            .update(&ctx, id(1), &Directives::new().set("n", n.to_string()), VersioningMode::Versioned)
            .unwrap();
    }
}

fn bench_store(c: &mut Criterion, name: &str, make: &dyn Fn(TableLayout) -> RecordStore) {
    let ctx = OpContext::background();
    let mut group = c.benchmark_group(name);
    group.throughput(Throughput::Elements(1));

    {
        let store = make(TableLayout::Versioned);
        let next = AtomicU64::new(1);
        group.bench_function("create", |b| {
            b.iter(|| {
                let n = next.fetch_add(1, Ordering::Relaxed);
                black_box(store.create(&ctx, id(n), sample_fields()).unwrap())
            })
        });
    }

    {
        let store = make(TableLayout::Versioned);
        seeded(&store);
        group.bench_function("get_latest", |b| {
            b.iter(|| black_box(store.get(&ctx, id(1), VersionSelector::Latest).unwrap()))
        });
        let old = Version::new(HISTORY_DEPTH / 2).unwrap();
        group.bench_function("get_exact", |b| {
            b.iter(|| black_box(store.get(&ctx, id(1), old.into()).unwrap()))
        });
        let directives = Directives::new().set("hot", "value").delete("field0");
        group.bench_function("update_versioned", |b| {
            b.iter(|| {
                black_box(
                    store
                        .update(&ctx, id(1), &directives, VersioningMode::Versioned)
                        .unwrap(),
                )
            })
        });
    }

    {
        let store = make(TableLayout::Legacy);
        store.create(&ctx, id(1), sample_fields()).unwrap();
        let directives = Directives::new().set("hot", "value");
        group.bench_function("update_legacy", |b| {
            b.iter(|| {
                black_box(
                    store
                        .update(&ctx, id(1), &directives, VersioningMode::Legacy)
                        .unwrap(),
                )
            })
        });
    }

    group.finish();
}

fn memory_benchmarks(c: &mut Criterion) {
    bench_store(c, "memory", &|layout| {
        RecordStore::new(Arc::new(MemoryTable::with_layout(layout)))
    });
}

fn sqlite_benchmarks(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let counter = AtomicU64::new(0);
    bench_store(c, "sqlite", &|layout| {
        let file = dir
            .path()
            .join(format!("bench-{}.db", counter.fetch_add(1, Ordering::Relaxed)));
        let config = SqliteConfig::new(file)
            .layout(layout)
            .sync_mode(SyncMode::Normal);
        RecordStore::new(Arc::new(SqliteTable::open(&config).unwrap()))
    });
}

criterion_group!(benches, memory_benchmarks, sqlite_benchmarks);
criterion_main!(benches);
