//! Named async worker pools fed by bounded queues
//!
//! # Features
//! - One registry per composition root keeps pool names unique
//! - Bounded FIFO queue per pool, submitters wait while it is full
//! - Panics inside tasks are caught per task; workers keep running
//! - Failures and panics are routed to an optional error handler
//! - `close` drains every queued task before returning
//! - Request metadata and buffer dispatch helpers for the surrounding service

pub mod buffer;
pub mod errors;
pub mod metadata;
pub mod model;
pub mod pool;
pub mod registry;
pub mod task;

pub use errors::{BufferError, PoolError, TaskError};
pub use metadata::Metadata;
pub use model::{PoolMetrics, PoolState};
pub use pool::{error_handler, ErrorHandler, PoolConfig, TaskPool, TaskPoolInner};
pub use registry::Registry;
pub use task::{BoxTask, Task};
