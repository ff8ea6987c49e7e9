//! Fixed worker pool over contiguous item ranges, first error wins.
//!
//! Each worker owns one range from [`partition`] for the whole batch and walks it
//! in order. The first failing action is recorded and cancels a batch-scoped token;
//! every worker checks that token before starting its next item, so no new actions
//! begin after a failure. Actions already in flight are left to finish.
//!
//! The caller's token is a different signal: it stands for shutdown or a deadline.
//! It is handed to every action so subprocess-backed actions can kill their child
//! when it fires. The batch token is derived from it, so it also stops the workers.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::types::{BatchStats, Phase};

use super::partition::{WorkRange, partition};

/// Work applied to every item of a batch
#[async_trait]
pub trait BatchAction<T>: Send + Sync {
    /// Process one item
    ///
    /// `cancel` fires on shutdown or deadline, not when a sibling item fails.
    async fn run(&self, item: &T, cancel: &CancellationToken) -> Result<()>;
}

/// Adapter turning an async closure into a [`BatchAction`]
pub struct FnAction<T, F> {
    f: F,
    _item: PhantomData<fn(T)>,
}

#[async_trait]
impl<T, F, Fut> BatchAction<T> for FnAction<T, F>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(T, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn run(&self, item: &T, cancel: &CancellationToken) -> Result<()> {
        (self.f)(item.clone(), cancel.clone()).await
    }
}

/// Wrap an async closure as a shareable batch action
///
/// # Examples
///
/// ```
/// use toolstrap::batch::action_fn;
///
/// let action = action_fn(|n: u32, _cancel| async move {
///     tracing::debug!(n, "processing");
///     Ok(())
/// });
/// # let _ = action;
/// ```
pub fn action_fn<T, F, Fut>(f: F) -> Arc<dyn BatchAction<T>>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(T, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnAction {
        f,
        _item: PhantomData,
    })
}

/// Slot holding the batch's reported error
///
/// A concrete failure always wins over `Cancelled`; among concrete failures the
/// first one recorded wins and later ones are dropped.
#[derive(Default)]
struct FirstError(Mutex<Option<Error>>);

impl FirstError {
    fn record(&self, err: Error) {
        let mut slot = match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let replace = match slot.as_ref() {
            None => true,
            Some(Error::Cancelled) => !matches!(err, Error::Cancelled),
            Some(_) => false,
        };
        if replace {
            *slot = Some(err);
        } else {
            tracing::debug!(error = %err, "Discarding error after first failure");
        }
    }

    fn take(&self) -> Option<Error> {
        match self.0.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

/// State shared by all workers of one batch
struct Shared<T> {
    items: Arc<[T]>,
    action: Arc<dyn BatchAction<T>>,
    external: CancellationToken,
    batch: CancellationToken,
    first_error: FirstError,
    started: AtomicUsize,
    succeeded: AtomicUsize,
    phase: Option<Phase>,
}

/// Runs a list of items across a fixed number of workers
#[derive(Clone, Debug)]
pub struct BatchRunner {
    workers: usize,
    phase: Option<Phase>,
}

impl BatchRunner {
    /// Create a runner with the given pool size
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when `workers` is zero.
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::InvalidArgument(
                "worker count must be at least 1".into(),
            ));
        }
        Ok(Self {
            workers,
            phase: None,
        })
    }

    /// Tag log lines with the phase this runner serves
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Apply `action` to every item and wait for all workers to finish.
    ///
    /// Launches one worker per range returned by [`partition`], so never more than
    /// `min(workers, items.len())`. Returns the batch statistics on success.
    ///
    /// # Errors
    ///
    /// - [`Error::ActionFailed`] naming the item whose action failed first
    /// - [`Error::Cancelled`] if `cancel` fired and no action failed
    /// - [`Error::WorkerPanicked`] if an action panicked
    pub async fn run<T>(
        &self,
        items: Vec<T>,
        action: Arc<dyn BatchAction<T>>,
        cancel: &CancellationToken,
    ) -> Result<BatchStats>
    where
        T: Display + Send + Sync + 'static,
    {
        let total = items.len();
        let ranges = partition(total, self.workers)?;
        let workers = ranges.len();

        let shared = Arc::new(Shared {
            items: Arc::from(items),
            action,
            external: cancel.clone(),
            batch: cancel.child_token(),
            first_error: FirstError::default(),
            started: AtomicUsize::new(0),
            succeeded: AtomicUsize::new(0),
            phase: self.phase,
        });

        // Workers stop at their next item if this future is dropped before they finish
        let _stop_on_drop = shared.batch.clone().drop_guard();

        tracing::info!(
            phase = ?self.phase,
            items = total,
            workers,
            "Starting batch"
        );

        let handles: Vec<_> = ranges
            .into_iter()
            .enumerate()
            .map(|(worker, range)| tokio::spawn(run_worker(Arc::clone(&shared), worker, range)))
            .collect();

        // Barrier: every worker has stopped before the result is decided
        let joined = futures::future::join_all(handles).await;
        for (worker, result) in joined.into_iter().enumerate() {
            if let Err(e) = result {
                tracing::error!(phase = ?self.phase, worker, error = %e, "Worker task failed");
                shared.first_error.record(Error::WorkerPanicked(format!("worker {worker}: {e}")));
                shared.batch.cancel();
            }
        }

        let stats = BatchStats {
            total,
            workers,
            started: shared.started.load(Ordering::SeqCst),
            succeeded: shared.succeeded.load(Ordering::SeqCst),
        };

        match shared.first_error.take() {
            Some(err) => {
                tracing::warn!(
                    phase = ?self.phase,
                    error = %err,
                    started = stats.started,
                    skipped = stats.skipped(),
                    "Batch failed"
                );
                Err(err)
            }
            None => {
                tracing::info!(
                    phase = ?self.phase,
                    items = stats.total,
                    workers = stats.workers,
                    "Batch complete"
                );
                Ok(stats)
            }
        }
    }
}

async fn run_worker<T>(shared: Arc<Shared<T>>, worker: usize, range: WorkRange)
where
    T: Display + Send + Sync + 'static,
{
    let phase = shared.phase;

    for index in range.begin..range.end {
        if shared.batch.is_cancelled() {
            if shared.external.is_cancelled() {
                shared.first_error.record(Error::Cancelled);
            }
            tracing::debug!(
                ?phase,
                worker,
                skipped = range.end - index,
                "Worker stopping at item boundary"
            );
            return;
        }

        let item = &shared.items[index];
        shared.started.fetch_add(1, Ordering::SeqCst);
        tracing::info!(?phase, worker, item = %item, "Working with");

        let outcome = AssertUnwindSafe(shared.action.run(item, &shared.external))
            .catch_unwind()
            .await;
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(?phase, worker, item = %item, panic = %message, "Action panicked");
                shared.first_error.record(Error::WorkerPanicked(format!(
                    "worker {worker} on {item}: {message}"
                )));
                shared.batch.cancel();
                return;
            }
        };

        match result {
            Ok(()) => {
                shared.succeeded.fetch_add(1, Ordering::SeqCst);
                tracing::info!(?phase, worker, item = %item, "Finished with");
            }
            Err(e) => {
                tracing::error!(?phase, worker, item = %item, error = %e, "Action failed");
                shared.first_error.record(Error::action_failed(item, e));
                shared.batch.cancel();
                return;
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
