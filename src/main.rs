use async_taskpool::{error_handler, PoolConfig, Registry, TaskPoolInner};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Instant,
};
use tokio::runtime::Builder;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let rt = Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()?;

    rt.block_on(async {
        let now = Instant::now();
        let registry = Arc::new(Registry::new());
        let failures = Arc::new(AtomicUsize::new(0));
        let failures_clone = failures.clone();

        let pool = TaskPoolInner::create(
            &registry,
            "demo",
            PoolConfig::cpu_bound(),
            error_handler(move |_| {
                failures_clone.fetch_add(1, Ordering::Relaxed);
            }),
        )?;

        for i in 0..100_000u64 {
            pool.post(move || async move {
                if i % 10_000 == 0 {
                    anyhow::bail!("task {i} rejected");
                }
                Ok(())
            })
            .await?;
        }
        pool.close().await?;

        let metrics = pool.metrics();
        println!(
            "completed: {}, failed: {}, elapsed: {:?}",
            metrics.completed_tasks,
            failures.load(Ordering::Relaxed),
            now.elapsed()
        );
        anyhow::Ok(())
    })
}
