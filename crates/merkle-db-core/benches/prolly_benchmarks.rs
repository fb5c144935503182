//! Benchmarks for prolly tree bulk-apply throughput and clock
//! ancestry-walk cost.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use merkle_blockstore::{BlockStore, MemoryBlockStore};
use merkle_db_core::{Clock, Head, ProllyTree, TreeEntry};
use std::sync::Arc;

fn bulk_entries(size: usize) -> Vec<TreeEntry<String, Vec<u8>>> {
    (0..size)
        .map(|i| {
            TreeEntry::Put(
                format!("key-{:08}", i),
                format!("value-{}", i).into_bytes(),
            )
        })
        .collect()
}

fn bench_bulk_build(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("prolly_bulk_build");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                rt.block_on(async {
                    let store = Arc::new(MemoryBlockStore::new());
                    let tree: ProllyTree<String, Vec<u8>, _> = ProllyTree::new(store);
                    let (root, blocks) = tree.bulk(bulk_entries(size)).await.unwrap();
                    black_box((root, blocks))
                })
            });
        });
    }

    group.finish();
}

async fn populated_tree(size: usize) -> (ProllyTree<String, Vec<u8>, MemoryBlockStore>, Arc<MemoryBlockStore>) {
    let store = Arc::new(MemoryBlockStore::new());
    let tree: ProllyTree<String, Vec<u8>, _> = ProllyTree::new(Arc::clone(&store));
    let (root, blocks) = tree.bulk(bulk_entries(size)).await.unwrap();
    for block in blocks {
        store.put(block).await.unwrap();
    }
    (ProllyTree::load(Arc::clone(&store), root), store)
}

fn bench_lookup(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (tree, _store) = rt.block_on(populated_tree(1000));

    let mut group = c.benchmark_group("prolly_lookup");

    group.bench_function("existing_key", |b| {
        b.iter(|| {
            rt.block_on(async { black_box(tree.get(&"key-00000500".to_string()).await.unwrap()) })
        });
    });

    group.bench_function("missing_key", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(tree.get(&"nonexistent".to_string()).await.unwrap())
            })
        });
    });

    group.finish();
}

fn bench_range_scan(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (tree, _store) = rt.block_on(populated_tree(1000));

    let mut group = c.benchmark_group("prolly_range");

    for range_size in [10, 100, 500].iter() {
        group.bench_with_input(
            BenchmarkId::new("scan", range_size),
            range_size,
            |b, &range_size| {
                let lo = "key-00000100".to_string();
                let hi = format!("key-{:08}", 100 + range_size);
                b.iter(|| {
                    rt.block_on(async { black_box(tree.range(&lo, &hi).await.unwrap()) })
                });
            },
        );
    }

    group.finish();
}

fn bench_bulk_delete(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("prolly_bulk_delete", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = Arc::new(MemoryBlockStore::new());
                let tree: ProllyTree<String, Vec<u8>, _> = ProllyTree::new(Arc::clone(&store));
                let (root, blocks) = tree.bulk(bulk_entries(100)).await.unwrap();
                for block in blocks {
                    store.put(block).await.unwrap();
                }

                let tree = ProllyTree::load(Arc::clone(&store), root);
                let deletions: Vec<_> = (0..100)
                    .map(|i| TreeEntry::Del(format!("key-{:08}", i)))
                    .collect();
                black_box(tree.bulk(deletions).await.unwrap())
            })
        });
    });
}

fn bench_clock_since(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("clock_since");

    for chain_len in [10, 100, 500].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(chain_len),
            chain_len,
            |b, &chain_len| {
                let store = Arc::new(MemoryBlockStore::new());
                let clock = Clock::new(Arc::clone(&store));
                let head = rt.block_on(async {
                    let mut head = Head::new();
                    for i in 0..chain_len {
                        let event = clock.create_event(
                            &head,
                            merkle_db_core::EventData::Put {
                                key: format!("k{}", i),
                                value: vec![],
                            },
                        );
                        let cid = event.store(store.as_ref()).await.unwrap();
                        head = clock.advance(&head, cid).await.unwrap();
                    }
                    head
                });

                b.iter(|| {
                    rt.block_on(async {
                        black_box(clock.since(&head, &Head::new()).await.unwrap())
                    })
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_bulk_build,
    bench_lookup,
    bench_range_scan,
    bench_bulk_delete,
    bench_clock_since,
);

criterion_main!(benches);
