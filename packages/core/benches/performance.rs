//! Performance benchmarks for subject tree operations
//!
//! Run with: `cargo bench -p subject-tree-core`
//!
//! These benchmarks measure critical path performance:
//! - Nested-set numbering of large forests (pure computation)
//! - Full repair against a store
//! - Round-trip reconciliation of an unchanged snapshot
//! - Appending children through the service (libsql file database)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::sync::Arc;
use subject_tree_core::db::{LibsqlStore, MemoryStore, SubjectStore, TreeLink};
use subject_tree_core::tree::NestedSetIndex;
use subject_tree_core::{TreeConfig, TreeScope, TreeService};
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// Forest links with `fanout` children per subject until `count` subjects exist
fn generate_links(count: usize, fanout: usize) -> Vec<TreeLink> {
    (0..count)
        .map(|i| TreeLink {
            id: format!("s{:06}", i),
            parent_id: if i == 0 {
                None
            } else {
                Some(format!("s{:06}", (i - 1) / fanout))
            },
            sort: ((i.max(1) - 1) % fanout) as i64,
            left_bound: 0,
            right_bound: 0,
        })
        .collect()
}

/// Build a service over a memory store holding `count` subjects
async fn setup_memory_service(count: usize, fanout: usize) -> TreeService {
    let store: Arc<dyn SubjectStore> = Arc::new(MemoryStore::new());
    let service = TreeService::new(store, TreeScope::Whole, TreeConfig::default()).unwrap();

    let mut ids: Vec<String> = Vec::with_capacity(count);
    for i in 0..count {
        let attributes = json!({ "name": format!("Subject {}", i) })
            .as_object()
            .cloned()
            .unwrap();
        let subject = if i == 0 {
            service.add_root(&attributes).await.unwrap()
        } else {
            service
                .add_child(&ids[(i - 1) / fanout], &attributes)
                .await
                .unwrap()
        };
        ids.push(subject.id);
    }
    service
}

/// Benchmark in-memory bound computation
fn bench_compute_forest(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_forest");

    for count in [1_000usize, 10_000] {
        let links = generate_links(count, 8);
        group.bench_with_input(BenchmarkId::from_parameter(count), &links, |b, links| {
            b.iter(|| NestedSetIndex::compute_forest(black_box(links)).unwrap())
        });
    }

    group.finish();
}

/// Benchmark repair of an already consistent forest
///
/// Nothing is rewritten, so this isolates the read and compute cost.
fn bench_repair(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let service = rt.block_on(setup_memory_service(500, 6));

    c.bench_function("repair_500_consistent", |b| {
        b.iter(|| rt.block_on(service.repair(None)).unwrap())
    });
}

/// Benchmark reconciling an unchanged snapshot
fn bench_noop_reconcile(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let service = rt.block_on(setup_memory_service(500, 6));
    let snapshot = rt.block_on(service.render()).unwrap();

    let mut group = c.benchmark_group("reconcile");
    group.sample_size(20);
    group.bench_function("noop_500", |b| {
        b.iter(|| rt.block_on(service.reconcile(black_box(&snapshot))).unwrap())
    });
    group.finish();
}

/// Benchmark appending children in a libsql file database
///
/// Each append is one batch: create, full repair, commit.
fn bench_add_child(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("add_child");
    group.sample_size(10);
    group.bench_function("libsql_append", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let temp_dir = TempDir::new().unwrap();
                let store = Arc::new(
                    LibsqlStore::new(temp_dir.path().join("bench.db"))
                        .await
                        .unwrap(),
                );
                let service =
                    TreeService::new(store, TreeScope::Whole, TreeConfig::default()).unwrap();
                let parent = service
                    .add_root(&json!({"name": "Parent"}).as_object().cloned().unwrap())
                    .await
                    .unwrap();

                let start = std::time::Instant::now();
                for i in 0..iters {
                    let attributes = json!({ "name": format!("Child {}", i) })
                        .as_object()
                        .cloned()
                        .unwrap();
                    service.add_child(&parent.id, &attributes).await.unwrap();
                }
                start.elapsed()
            })
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_compute_forest,
    bench_repair,
    bench_noop_reconcile,
    bench_add_child
);
criterion_main!(benches);
