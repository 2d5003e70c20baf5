//! Batch copy throughput benchmarks

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use migcopy::engine::threaded::build_shared_pool;
use migcopy::prelude::*;
use std::sync::Arc;

const UNIT_LEN: usize = 4096;
const UNIT_COUNT: usize = 256;

fn bench_copy_batch(c: &mut Criterion) {
    let srcs: Vec<Vec<u8>> = (0..UNIT_COUNT)
        .map(|i| vec![i as u8; UNIT_LEN])
        .collect();
    let mut dsts: Vec<Vec<u8>> = (0..UNIT_COUNT).map(|_| vec![0u8; UNIT_LEN]).collect();

    let mut group = c.benchmark_group("copy_batch");
    group.throughput(Throughput::Bytes((UNIT_LEN * UNIT_COUNT) as u64));

    group.bench_function("sync", |b| {
        b.iter(|| {
            let mut batch = Batch::with_capacity(UNIT_COUNT);
            for (dst, src) in dsts.iter_mut().zip(srcs.iter()) {
                batch.push_pair(dst, src).unwrap();
            }
            copy_batch_sync(&mut batch);
        })
    });

    let threaded = ThreadPoolCopyEngine::new(build_shared_pool(0).unwrap());
    group.bench_function("threaded_8_workers", |b| {
        b.iter(|| {
            let mut batch = Batch::with_capacity(UNIT_COUNT);
            for (dst, src) in dsts.iter_mut().zip(srcs.iter()) {
                batch.push_pair(dst, src).unwrap();
            }
            threaded.copy_batch(&mut batch, 8).unwrap();
        })
    });

    let channel = HardwareChannelCopyEngine::new(Arc::new(ChannelPool::with_cpu_channels(4)));
    group.bench_function("channel_4_channels", |b| {
        b.iter(|| {
            let mut batch = Batch::with_capacity(UNIT_COUNT);
            for (dst, src) in dsts.iter_mut().zip(srcs.iter()) {
                batch.push_pair(dst, src).unwrap();
            }
            channel.copy_batch(&mut batch, 4).unwrap();
        })
    });

    group.finish();
}

criterion_group!(benches, bench_copy_batch);
criterion_main!(benches);
