//! Bounded parallel dispatch of child batches.

use crate::budget::TimeoutBudget;
use crate::error::ConfigError;
use crate::model::WriteBatch;
use crate::report::BatchResult;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Counts from one dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Batches handed to a worker.
    pub started: usize,
    /// Batches never started because the deadline passed.
    pub aborted: usize,
}

/// Runs at most `limit` batches at a time.
///
/// Batches are started in plan order as slots free up, regardless of how the
/// previous occupant of the slot finished. Once the budget expires no further
/// batch is started; the rest are reported as aborted. Running batches are
/// left to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyLimiter {
    limit: usize,
}

impl ConcurrencyLimiter {
    /// Creates a limiter.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroConcurrency`] if `limit` is zero.
    pub fn new(limit: usize) -> Result<Self, ConfigError> {
        if limit == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(Self { limit })
    }

    /// Maximum batches in flight.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Dispatches `batches` through `work`, sending every result to
    /// `results`.
    ///
    /// Returns once every started batch has finished. Each batch yields
    /// exactly one result unless its task panics.
    pub async fn dispatch<F, Fut>(
        &self,
        batches: Vec<WriteBatch>,
        budget: TimeoutBudget,
        results: mpsc::Sender<BatchResult>,
        mut work: F,
    ) -> DispatchStats
    where
        F: FnMut(WriteBatch) -> Fut,
        Fut: Future<Output = BatchResult> + Send + 'static,
    {
        let permits = Arc::new(Semaphore::new(self.limit));
        let mut tasks = JoinSet::new();
        let mut stats = DispatchStats::default();
        let mut queue = batches.into_iter();

        while let Some(batch) = queue.next() {
            let permit = tokio::select! {
                biased;
                _ = budget.expired() => None,
                permit = Arc::clone(&permits).acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                let pending: Vec<usize> = std::iter::once(batch.index)
                    .chain(queue.by_ref().map(|b| b.index))
                    .collect();
                warn!(count = pending.len(), "deadline reached, aborting queued batches");
                for index in pending {
                    stats.aborted += 1;
                    let _ = results.send(BatchResult::aborted(index)).await;
                }
                break;
            };

            debug!(batch = batch.index, size = batch.size(), "dispatching batch");
            stats.started += 1;
            let job = work(batch);
            let tx = results.clone();
            tasks.spawn(async move {
                let result = job.await;
                drop(permit);
                let _ = tx.send(result).await;
            });
        }

        drop(results);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "batch task ended without a result");
            }
        }

        stats
    }
}
