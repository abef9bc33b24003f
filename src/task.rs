use super::errors::TaskError;
use futures::{future::BoxFuture, FutureExt};
use std::{any::Any, future::Future, panic::AssertUnwindSafe};

/// A unit of work executed by a pool worker.
///
/// The pool takes ownership of a task when it is posted and drops it after it
/// ran. Any `FnOnce() -> impl Future<Output = anyhow::Result<()>>` closure is a
/// task.
pub trait Task: Send + 'static {
    fn run(self: Box<Self>) -> BoxFuture<'static, anyhow::Result<()>>;
}

pub type BoxTask = Box<dyn Task>;

impl<F, Fut> Task for F
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn run(self: Box<Self>) -> BoxFuture<'static, anyhow::Result<()>> {
        (*self)().boxed()
    }
}

/// Runs a task to completion, turning a panic anywhere inside it (including
/// while building its future) into [`TaskError::Panicked`].
pub(crate) async fn run_isolated(task: BoxTask) -> Result<(), TaskError> {
    match AssertUnwindSafe(async move { task.run().await })
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(TaskError::Failed(err)),
        Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fails;

    impl Task for Fails {
        fn run(self: Box<Self>) -> BoxFuture<'static, anyhow::Result<()>> {
            async { Err(anyhow::anyhow!("boom")) }.boxed()
        }
    }

    #[tokio::test]
    async fn closure_task_succeeds() {
        let task: BoxTask = Box::new(|| async { anyhow::Ok(()) });
        assert!(run_isolated(task).await.is_ok());
    }

    #[tokio::test]
    async fn reported_failure_is_kept() {
        match run_isolated(Box::new(Fails)).await {
            Err(TaskError::Failed(err)) => assert_eq!(err.to_string(), "boom"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn panic_is_caught_with_message() {
        let task: BoxTask = Box::new(|| async {
            let items: Vec<u32> = Vec::new();
            let _ = items[3];
            anyhow::Ok(())
        });
        match run_isolated(task).await {
            Err(TaskError::Panicked(msg)) => assert!(msg.contains("index out of bounds")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn formatted_panic_message() {
        let input = 7;
        let task: BoxTask = Box::new(move || async move {
            if input > 5 {
                panic!("bad input {input}");
            }
            anyhow::Ok(())
        });
        match run_isolated(task).await {
            Err(TaskError::Panicked(msg)) => assert_eq!(msg, "bad input 7"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
