use serde::Serialize;

/// Lifecycle of a pool. Transitions only go forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PoolState {
    Open,
    Closing,
    Closed,
}

/// Point-in-time counters of a pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolMetrics {
    pub workers: usize,
    pub queue_capacity: usize,
    pub queued_tasks: usize,
    pub active_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub panicked_tasks: usize,
}

impl PoolMetrics {
    /// Share of workers currently executing a task.
    pub fn utilization(&self) -> f64 {
        if self.workers == 0 {
            return 0.0;
        }
        self.active_tasks.min(self.workers) as f64 / self.workers as f64
    }

    pub fn queue_pressure(&self) -> f64 {
        if self.queue_capacity == 0 {
            return 0.0;
        }
        self.queued_tasks as f64 / self.queue_capacity as f64
    }

    pub fn finished_tasks(&self) -> usize {
        self.completed_tasks + self.failed_tasks + self.panicked_tasks
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.finished_tasks();
        if total == 0 {
            return 1.0;
        }
        self.completed_tasks as f64 / total as f64
    }
}
