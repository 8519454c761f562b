use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Why a dispatched job did not produce a value
#[derive(Debug)]
pub enum WorkerFailure<E> {
    Failed(E),
    Panicked(String),
}

/// First failure of a batch, plus whatever completed before the batch was
/// cancelled
#[derive(Debug)]
pub struct DispatchFailure<T, E> {
    /// Position of the failed job in the submitted batch, when known
    pub position: Option<usize>,
    pub cause: WorkerFailure<E>,
    /// Values of jobs that finished, by batch position
    pub completed: Vec<Option<T>>,
}

/// Runs batches of jobs on a bounded number of tokio tasks
#[derive(Debug, Clone, Copy)]
pub struct WorkDispatcher {
    max_workers: usize,
}

impl WorkDispatcher {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Run every job, at most `max_workers` at a time.
    ///
    /// Values come back in submission order. On the first failure the rest
    /// of the batch is cancelled, and this only returns once every task has
    /// finished or been cancelled.
    pub async fn dispatch<T, E, Fut>(&self, jobs: Vec<Fut>) -> Result<Vec<T>, DispatchFailure<T, E>>
    where
        T: Send + 'static,
        E: Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let total = jobs.len();
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut join_set = JoinSet::new();

        for (position, job) in jobs.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                // Never closed, so acquiring only waits for a free worker
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = AssertUnwindSafe(job).catch_unwind().await;
                (position, outcome)
            });
        }

        let mut completed: Vec<Option<T>> = (0..total).map(|_| None).collect();
        let mut failure: Option<(Option<usize>, WorkerFailure<E>)> = None;

        while let Some(joined) = join_set.join_next().await {
            let (position, cause) = match joined {
                Ok((position, Ok(Ok(value)))) => {
                    completed[position] = Some(value);
                    continue;
                }
                Ok((position, Ok(Err(e)))) => (Some(position), WorkerFailure::Failed(e)),
                Ok((position, Err(panic))) => {
                    let message = panic_message(panic.as_ref());
                    error!("Worker {} panicked: {}", position, message);
                    (Some(position), WorkerFailure::Panicked(message))
                }
                Err(join_err) if join_err.is_cancelled() && failure.is_some() => continue,
                Err(join_err) => (None, WorkerFailure::Panicked(join_err.to_string())),
            };

            if failure.is_none() {
                debug!(
                    "Cancelling {} outstanding workers after failure",
                    join_set.len()
                );
                failure = Some((position, cause));
                join_set.abort_all();
            }
        }

        match failure {
            Some((position, cause)) => Err(DispatchFailure {
                position,
                cause,
                completed,
            }),
            None => Ok(completed.into_iter().flatten().collect()),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
