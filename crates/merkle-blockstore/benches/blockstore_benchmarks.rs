//! Benchmarks for BlockStore operations

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use merkle_blockstore::{Block, BlockStore, CidCodec, MemoryBlockStore};

fn generate_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

fn bench_put(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("blockstore_put");

    for size in [1024, 64 * 1024, 256 * 1024, 1024 * 1024].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let data = generate_data(size);
            b.iter(|| {
                rt.block_on(async {
                    let store = MemoryBlockStore::new();
                    let block = Block::from_data(data.clone(), CidCodec::Raw);
                    store.put(block.clone()).await.unwrap();
                    black_box(block.cid)
                })
            });
        });
    }

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("blockstore_get");

    for size in [1024, 64 * 1024, 256 * 1024].iter() {
        let data = generate_data(*size);
        let store = MemoryBlockStore::new();
        let block = Block::from_data(data, CidCodec::Raw);
        let cid = block.cid;
        rt.block_on(async { store.put(block).await.unwrap() });

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    let result = store.get(&cid).await.unwrap();
                    black_box(result)
                })
            });
        });
    }

    group.finish();
}

fn bench_has(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let store = MemoryBlockStore::new();
    let block = Block::from_data(generate_data(64 * 1024), CidCodec::Raw);
    let cid = block.cid;
    rt.block_on(async { store.put(block).await.unwrap() });

    let fake_cid = Block::from_data(b"nonexistent".as_slice(), CidCodec::Raw).cid;

    let mut group = c.benchmark_group("blockstore_has");

    group.bench_function("existing", |b| {
        b.iter(|| {
            rt.block_on(async { black_box(store.has(&cid).await.unwrap()) })
        });
    });

    group.bench_function("missing", |b| {
        b.iter(|| {
            rt.block_on(async { black_box(store.has(&fake_cid).await.unwrap()) })
        });
    });

    group.finish();
}

fn bench_entries(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("blockstore_entries");

    for count in [10, 100, 1000].iter() {
        let store = MemoryBlockStore::new();
        rt.block_on(async {
            for i in 0..*count {
                store
                    .put(Block::from_data(i.to_le_bytes().to_vec(), CidCodec::Raw))
                    .await
                    .unwrap();
            }
        });

        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| rt.block_on(async { black_box(store.entries().await.unwrap()) }));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_put, bench_get, bench_has, bench_entries);

criterion_main!(benches);
