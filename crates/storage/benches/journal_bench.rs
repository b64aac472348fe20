//! Benchmarks for the storage layer (journal + store).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use jotfile_core::{Document, Options};
use jotfile_storage::journal::Entry;
use jotfile_storage::{CompactionSort, IndexSpec, Journal, Store, UpsertMode};
use serde_json::json;
use tempfile::TempDir;

fn make_doc(id: usize, payload_size: usize) -> Document {
    json!({
        "_id": format!("key_{id:06}"),
        "payload": "x".repeat(payload_size),
        "tags": ["alpha", "beta"],
    })
    .as_object()
    .cloned()
    .unwrap()
}

fn bench_store_upsert(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_upsert");

    for size in [64, 1024, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut store = Store::new("_id");
            store.ensure_index(IndexSpec::new("tags")).unwrap();

            let mut i = 0usize;
            b.iter(|| {
                store.upsert(make_doc(i, size), UpsertMode::Insert).unwrap();
                i += 1;
            });
        });
    }
    group.finish();
}

fn bench_store_find(c: &mut Criterion) {
    let mut store = Store::new("_id");
    store.ensure_index(IndexSpec::new("tags")).unwrap();
    for i in 0..1000 {
        store.upsert(make_doc(i, 256), UpsertMode::Insert).unwrap();
    }

    c.bench_function("store_find", |b| {
        let mut i = 0usize;
        b.iter(|| {
            let key = json!(format!("key_{:06}", i % 1000));
            black_box(store.find("_id", &key).unwrap());
            i += 1;
        });
    });
}

fn bench_journal_append(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut journal = Journal::open(&dir.path().join("bench.db"), &Options::default()).unwrap();

    c.bench_function("journal_append", |b| {
        let mut i = 0usize;
        b.iter(|| {
            let doc = make_doc(i, 128);
            journal.append(&[Entry::Doc(&doc)]).unwrap();
            i += 1;
        });
    });
}

fn bench_journal_rewrite(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut journal = Journal::open(&dir.path().join("bench.db"), &Options::default()).unwrap();
    let mut store = Store::new("_id");
    for i in 0..1000 {
        store.upsert(make_doc(i, 256), UpsertMode::Insert).unwrap();
    }

    c.bench_function("journal_rewrite_1k", |b| {
        b.iter(|| {
            journal.rewrite(&store, &CompactionSort::Unsorted).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_store_upsert,
    bench_store_find,
    bench_journal_append,
    bench_journal_rewrite
);
criterion_main!(benches);
