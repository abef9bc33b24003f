use async_taskpool::{PoolConfig, Registry, TaskPoolInner};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::{
    hint::black_box,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

fn create_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()
        .unwrap()
}

// Post N trivial tasks and close, per worker count
fn bench_post_and_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("post_and_drain");
    let rt = create_runtime();
    let registry = Arc::new(Registry::new());

    for workers in [1, 4, 16] {
        for size in [1_000u64, 10_000] {
            group.throughput(Throughput::Elements(size));
            group.bench_with_input(
                BenchmarkId::new(format!("workers_{workers}"), size),
                &size,
                |b, &size| {
                    b.to_async(&rt).iter(|| {
                        let registry = registry.clone();
                        async move {
                            let pool = TaskPoolInner::create(
                                &registry,
                                "bench",
                                PoolConfig::new(workers, 256),
                                None,
                            )
                            .unwrap();
                            let counter = Arc::new(AtomicUsize::new(0));
                            for i in 0..size {
                                let counter = counter.clone();
                                pool.post(move || async move {
                                    black_box(i);
                                    counter.fetch_add(1, Ordering::Relaxed);
                                    anyhow::Ok(())
                                })
                                .await
                                .unwrap();
                            }
                            pool.close().await.unwrap();
                            black_box(counter.load(Ordering::Relaxed));
                        }
                    });
                },
            );
        }
    }

    group.finish();
}

// Non-waiting submission into a roomy queue
fn bench_try_post(c: &mut Criterion) {
    let rt = create_runtime();
    let registry = Arc::new(Registry::new());

    c.bench_function("try_post_1000", |b| {
        b.to_async(&rt).iter(|| {
            let registry = registry.clone();
            async move {
                let pool =
                    TaskPoolInner::create(&registry, "bench_try", PoolConfig::new(4, 1_024), None)
                        .unwrap();
                for i in 0..1_000u64 {
                    pool.try_post(move || async move {
                        black_box(i);
                        anyhow::Ok(())
                    })
                    .unwrap();
                }
                pool.close().await.unwrap();
            }
        });
    });
}

criterion_group!(benches, bench_post_and_drain, bench_try_post);
criterion_main!(benches);
