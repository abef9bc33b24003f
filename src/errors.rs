/// Errors returned by pool lifecycle and submission calls.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("task pool name duplicated: {0}")]
    DuplicateName(String),

    #[error("invalid task pool config: {0}")]
    InvalidConfig(String),

    #[error("task pool must be created inside a tokio runtime")]
    NoRuntime,

    /// The pool no longer accepts submissions.
    #[error("task pool `{0}` is closed")]
    Closed(String),

    #[error("task pool `{0}` queue is full")]
    QueueFull(String),

    #[error("task pool `{0}` was already closed")]
    AlreadyClosed(String),
}

/// Failure of a single task execution, as handed to the pool's error handler.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task failed: {0:#}")]
    Failed(#[source] anyhow::Error),

    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    #[inline]
    pub fn is_panic(&self) -> bool {
        matches!(self, TaskError::Panicked(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("buffer `{0}` not found")]
    UnknownBuffer(String),

    #[error("buffer `{buffer}` rejected item: {reason}")]
    Rejected { buffer: String, reason: String },
}
