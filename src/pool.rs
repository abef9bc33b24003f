use super::{
    errors::{PoolError, TaskError},
    model::{PoolMetrics, PoolState},
    registry::Registry,
    task::{panic_message, run_isolated, BoxTask, Task},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::{
    runtime::Handle,
    sync::{mpsc, mpsc::error::TrySendError, Mutex as AsyncMutex},
    time::Duration,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

/// Sizing of a task pool. Both values are fixed for the lifetime of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            workers: num_cpus * 2,
            queue_capacity: num_cpus * 20,
        }
    }
}

impl PoolConfig {
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        Self {
            workers,
            queue_capacity,
        }
    }

    pub fn cpu_bound() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            workers: num_cpus,
            queue_capacity: num_cpus * 10,
        }
    }

    pub fn io_bound() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            workers: num_cpus * 4,
            queue_capacity: num_cpus * 100,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if self.workers == 0 {
            return Err(PoolError::InvalidConfig(
                "worker count must be at least 1".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(PoolError::InvalidConfig(
                "queue capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Callback receiving every failed or panicked task execution.
pub type ErrorHandler = Arc<dyn Fn(TaskError) + Send + Sync>;

pub type TaskPool = Arc<TaskPoolInner>;

/// Wraps a closure as an [`ErrorHandler`] for [`TaskPoolInner::create`].
pub fn error_handler<F>(f: F) -> Option<ErrorHandler>
where
    F: Fn(TaskError) + Send + Sync + 'static,
{
    Some(Arc::new(f))
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicUsize,
    active: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    panicked: AtomicUsize,
}

struct Lifecycle {
    state: PoolState,
    // Dropping the last sender is what lets workers see the end of the queue.
    sender: Option<mpsc::Sender<BoxTask>>,
}

/// State shared by the workers of one pool. Workers never hold the pool itself,
/// so dropping the last pool handle still closes the queue.
struct WorkerShared {
    pool: Arc<str>,
    receiver: AsyncMutex<mpsc::Receiver<BoxTask>>,
    on_error: Option<ErrorHandler>,
    counters: Arc<Counters>,
}

/// A named group of workers consuming one bounded FIFO queue of tasks.
///
/// Tasks are admitted in FIFO order; with more than one worker they may
/// complete in any order. A task runs to completion once a worker picked it up.
pub struct TaskPoolInner {
    name: Arc<str>,
    config: PoolConfig,
    registry: Arc<Registry>,
    lifecycle: Mutex<Lifecycle>,
    closing: CancellationToken,
    workers: TaskTracker,
    counters: Arc<Counters>,
    runtime: Handle,
}

impl TaskPoolInner {
    /// Registers `name` in `registry` and starts `config.workers` workers on the
    /// current tokio runtime.
    ///
    /// Nothing is registered or spawned when an error is returned.
    pub fn create(
        registry: &Arc<Registry>,
        name: impl Into<String>,
        config: PoolConfig,
        on_error: Option<ErrorHandler>,
    ) -> Result<TaskPool, PoolError> {
        let name: String = name.into();
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| PoolError::NoRuntime)?;

        if !registry.add(&name) {
            return Err(PoolError::DuplicateName(name));
        }

        let name: Arc<str> = name.into();
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let counters = Arc::new(Counters::default());
        let shared = Arc::new(WorkerShared {
            pool: name.clone(),
            receiver: AsyncMutex::new(receiver),
            on_error,
            counters: counters.clone(),
        });

        let workers = TaskTracker::new();
        for worker in 0..config.workers {
            workers.spawn_on(worker_loop(worker, shared.clone()), &runtime);
        }
        workers.close();

        info!(
            pool = %name,
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "task pool created"
        );

        Ok(Arc::new(Self {
            name,
            config,
            registry: registry.clone(),
            lifecycle: Mutex::new(Lifecycle {
                state: PoolState::Open,
                sender: Some(sender),
            }),
            closing: CancellationToken::new(),
            workers,
            counters,
            runtime,
        }))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Current lifecycle state. A pool whose workers all exited after close
    /// began reports [`PoolState::Closed`], even if the `close` future was
    /// dropped before it finished.
    pub fn state(&self) -> PoolState {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state == PoolState::Closing && self.workers.is_empty() {
            lifecycle.state = PoolState::Closed;
        }
        lifecycle.state
    }

    /// Enqueues one task, waiting for a free slot while the queue is full.
    ///
    /// Fails with [`PoolError::Closed`] once [`close`](Self::close) has begun,
    /// including for a call that was still waiting for a slot at that moment.
    pub async fn post<T: Task>(&self, task: T) -> Result<(), PoolError> {
        self.post_boxed(Box::new(task)).await
    }

    pub async fn post_boxed(&self, task: BoxTask) -> Result<(), PoolError> {
        let sender = self.open_sender()?;

        let permit = tokio::select! {
            biased;
            _ = self.closing.cancelled() => return Err(self.closed()),
            permit = sender.reserve() => permit.map_err(|_| self.closed())?,
        };

        self.counters.queued.fetch_add(1, Ordering::Relaxed);
        permit.send(task);
        Ok(())
    }

    /// Enqueues tasks in order. Tasks posted concurrently by other callers may
    /// interleave with the batch. Stops at the first task that cannot be posted.
    pub async fn post_all<I>(&self, tasks: I) -> Result<(), PoolError>
    where
        I: IntoIterator<Item = BoxTask>,
    {
        for task in tasks {
            self.post_boxed(task).await?;
        }
        Ok(())
    }

    /// Enqueues one task without waiting. A full queue yields
    /// [`PoolError::QueueFull`] and the task is dropped.
    pub fn try_post<T: Task>(&self, task: T) -> Result<(), PoolError> {
        let sender = self.open_sender()?;

        let result = match sender.try_reserve() {
            Ok(permit) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                permit.send(Box::new(task));
                Ok(())
            }
            Err(TrySendError::Full(())) => Err(PoolError::QueueFull(self.name.to_string())),
            Err(TrySendError::Closed(())) => Err(self.closed()),
        };
        result
    }

    /// Releases the name, stops accepting tasks and waits until every queued
    /// task ran and all workers exited.
    ///
    /// Only the first call closes the pool; later calls return
    /// [`PoolError::AlreadyClosed`]. If the returned future is dropped before it
    /// completes, workers keep draining and [`state`](Self::state) moves to
    /// [`PoolState::Closed`] once they exited.
    pub async fn close(&self) -> Result<(), PoolError> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state != PoolState::Open {
                return Err(PoolError::AlreadyClosed(self.name.to_string()));
            }
            lifecycle.state = PoolState::Closing;
            lifecycle.sender = None;
        }
        self.registry.remove(&self.name);
        self.closing.cancel();

        debug!(
            pool = %self.name,
            queued = self.counters.queued.load(Ordering::Relaxed),
            "draining task pool"
        );
        self.workers.wait().await;

        self.lifecycle.lock().state = PoolState::Closed;
        info!(
            pool = %self.name,
            completed = self.counters.completed.load(Ordering::Relaxed),
            failed = self.counters.failed.load(Ordering::Relaxed),
            panicked = self.counters.panicked.load(Ordering::Relaxed),
            "task pool closed"
        );
        Ok(())
    }

    #[inline]
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            workers: self.config.workers,
            queue_capacity: self.config.queue_capacity,
            queued_tasks: self.counters.queued.load(Ordering::Relaxed),
            active_tasks: self.counters.active.load(Ordering::Relaxed),
            completed_tasks: self.counters.completed.load(Ordering::Relaxed),
            failed_tasks: self.counters.failed.load(Ordering::Relaxed),
            panicked_tasks: self.counters.panicked.load(Ordering::Relaxed),
        }
    }

    /// Hands a metrics snapshot to `callback` every `interval`.
    ///
    /// The monitor runs on the runtime the pool was created on, so this can be
    /// called from any thread. Cancel the returned token to stop. The monitor
    /// only keeps a weak reference and also stops once the pool is dropped.
    pub fn start_monitoring<F>(
        self: &Arc<Self>,
        interval: Duration,
        callback: F,
    ) -> CancellationToken
    where
        F: Fn(PoolMetrics) + Send + 'static,
    {
        let pool = Arc::downgrade(self);
        let token = CancellationToken::new();
        let token_clone = token.clone();

        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let Some(pool) = pool.upgrade() else { break };
                        callback(pool.metrics());
                    }
                    _ = token_clone.cancelled() => break,
                }
            }
        });

        token
    }

    pub fn stop_monitoring(token: CancellationToken) {
        token.cancel();
    }

    fn open_sender(&self) -> Result<mpsc::Sender<BoxTask>, PoolError> {
        let lifecycle = self.lifecycle.lock();
        match (lifecycle.state, &lifecycle.sender) {
            (PoolState::Open, Some(sender)) => Ok(sender.clone()),
            _ => Err(self.closed()),
        }
    }

    #[inline]
    fn closed(&self) -> PoolError {
        PoolError::Closed(self.name.to_string())
    }
}

impl fmt::Debug for TaskPoolInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPool")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

impl Drop for TaskPoolInner {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle.get_mut();
        if lifecycle.state != PoolState::Open {
            return;
        }
        lifecycle.state = PoolState::Closing;
        lifecycle.sender = None;
        self.registry.remove(&self.name);
        self.closing.cancel();
        warn!(pool = %self.name, "task pool dropped without close, draining in background");
    }
}

async fn worker_loop(worker: usize, shared: Arc<WorkerShared>) {
    debug!(pool = %shared.pool, worker, "worker started");

    loop {
        let next = shared.receiver.lock().await.recv().await;
        let Some(task) = next else { break };

        shared.counters.queued.fetch_sub(1, Ordering::Relaxed);
        shared.counters.active.fetch_add(1, Ordering::Relaxed);
        let outcome = run_isolated(task).await;
        shared.counters.active.fetch_sub(1, Ordering::Relaxed);

        match outcome {
            Ok(()) => {
                shared.counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => shared.report(worker, err),
        }
    }

    debug!(pool = %shared.pool, worker, "worker exited");
}

impl WorkerShared {
    fn report(&self, worker: usize, err: TaskError) {
        if err.is_panic() {
            self.counters.panicked.fetch_add(1, Ordering::Relaxed);
            error!(pool = %self.pool, worker, error = %err, "recovered from task panic");
        } else {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(pool = %self.pool, worker, error = %err, "task failed");
        }

        let Some(handler) = &self.on_error else { return };
        // The handler runs on this worker; a panic in it must not end the loop.
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(err))) {
            error!(
                pool = %self.pool,
                worker,
                panic = %panic_message(payload.as_ref()),
                "error handler panicked"
            );
        }
    }
}
