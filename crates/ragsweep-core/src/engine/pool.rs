//! Bounded-concurrency execution of independent units of work.
//!
//! A counting semaphore of size `limit` is the only concurrency control: each
//! spawned task acquires a permit before its body runs and drops it when the
//! body finishes, fails or panics. Results come back in completion order.
//! A failing task never cancels its siblings.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Why a submitted unit produced no value.
#[derive(Debug, thiserror::Error)]
pub enum TaskError<E> {
    #[error("{0}")]
    Failed(E),
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("task cancelled")]
    Cancelled,
}

/// One finished unit. `index` is the submission index.
#[derive(Debug)]
pub struct Completed<T, E> {
    pub index: usize,
    pub outcome: Result<T, TaskError<E>>,
}

pub struct BoundedTaskRunner<T, E> {
    semaphore: Arc<Semaphore>,
    join_set: JoinSet<(usize, Result<T, TaskError<E>>)>,
    limit: usize,
    submitted: usize,
    completed: usize,
}

impl<T, E> BoundedTaskRunner<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            join_set: JoinSet::new(),
            limit,
            submitted: 0,
            completed: 0,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Spawns `fut`; it waits for a permit before running. Returns the
    /// submission index reported back in [`Completed::index`].
    pub fn submit<F>(&mut self, fut: F) -> usize
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let index = self.submitted;
        self.submitted += 1;
        let sem = self.semaphore.clone();
        self.join_set.spawn(async move {
            let _permit = match sem.acquire_owned().await {
                Ok(p) => p,
                Err(_) => return (index, Err(TaskError::Cancelled)),
            };
            let outcome = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result.map_err(TaskError::Failed),
                Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
            };
            (index, outcome)
        });
        index
    }

    /// Next finished unit in completion order; `None` once everything
    /// submitted so far has been returned.
    pub async fn next_completed(&mut self) -> Option<Completed<T, E>> {
        let joined = self.join_set.join_next().await?;
        self.completed += 1;
        Some(match joined {
            Ok((index, outcome)) => Completed { index, outcome },
            // Only reachable if the runtime aborted the task; its index is lost.
            Err(join_err) if join_err.is_cancelled() => Completed {
                index: usize::MAX,
                outcome: Err(TaskError::Cancelled),
            },
            Err(join_err) => Completed {
                index: usize::MAX,
                outcome: Err(TaskError::Panicked(join_err.to_string())),
            },
        })
    }

    /// Units submitted but not yet returned by `next_completed`.
    pub fn pending(&self) -> usize {
        self.submitted - self.completed
    }

    /// Drains every submitted unit, in completion order.
    pub async fn collect_all(mut self) -> Vec<Completed<T, E>> {
        let mut out = Vec::with_capacity(self.pending());
        while let Some(c) = self.next_completed().await {
            out.push(c);
        }
        out
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
