//! End-to-end snapshot write.

use crate::aggregator::ResultAggregator;
use crate::breaker::{CircuitBreaker, NoopCircuitBreaker};
use crate::budget::TimeoutBudget;
use crate::classify::{DefaultClassifier, ErrorClassifier};
use crate::config::WriterConfig;
use crate::error::{WriteError, WriteResult};
use crate::limiter::ConcurrencyLimiter;
use crate::model::{Snapshot, WriteOp};
use crate::planner::{BatchPlan, BatchPlanner};
use crate::report::{PhaseTimings, WriteReport};
use crate::retry::RetryExecutor;
use crate::state::{StateMachine, WriterState};
use crate::store::{DocumentStore, StoreError, StoreResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Writes snapshots to a document store in bounded, retried batches.
///
/// The writer holds no per-write state and can be shared between jobs.
///
/// # Example
///
/// ```
/// use perfdash_writer::{MemoryStore, Snapshot, SnapshotWriter, WriterConfig, WriteStatus};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # tokio_test_block_on(async {
/// let store = Arc::new(MemoryStore::new());
/// let writer = SnapshotWriter::new(WriterConfig::default(), store.clone());
///
/// let snapshot = Snapshot::new("2024-w07", json!({"week": 7}));
/// let report = writer.write(&snapshot).await.unwrap();
/// assert_eq!(report.status(), WriteStatus::Complete);
/// assert!(store.contains("2024-w07"));
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
pub struct SnapshotWriter {
    config: WriterConfig,
    store: Arc<dyn DocumentStore>,
    classifier: Arc<dyn ErrorClassifier>,
    breaker: Arc<dyn CircuitBreaker>,
}

impl SnapshotWriter {
    /// Creates a writer with the default classifier and no circuit breaker.
    pub fn new(config: WriterConfig, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            config,
            store,
            classifier: Arc::new(DefaultClassifier),
            breaker: Arc::new(NoopCircuitBreaker),
        }
    }

    /// Replaces the error classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Installs a circuit breaker consulted before every attempt.
    #[must_use]
    pub fn with_circuit_breaker(mut self, breaker: Arc<dyn CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    /// The writer configuration.
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Plans `snapshot` without writing anything.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Config`] or [`WriteError::InvalidSnapshot`].
    pub fn plan(&self, snapshot: &Snapshot) -> WriteResult<BatchPlan> {
        self.config.validate()?;
        BatchPlanner::new(self.config.max_batch_size)?.plan(snapshot)
    }

    /// Writes `snapshot`.
    ///
    /// The root batch is committed first. Child batches are only dispatched
    /// once it has succeeded, at most `max_concurrency` at a time, until the
    /// total timeout passes.
    ///
    /// A partially written snapshot is not an error: the returned report has
    /// status `Partial` and lists failed and aborted children.
    ///
    /// # Errors
    ///
    /// - [`WriteError::Config`] / [`WriteError::InvalidSnapshot`] before any
    ///   store call
    /// - [`WriteError::RootFailed`] if the root batch could not be committed;
    ///   the attached report has status `Failed`
    pub async fn write(&self, snapshot: &Snapshot) -> WriteResult<WriteReport> {
        let budget = TimeoutBudget::start(self.config.total_timeout);
        let mut machine = StateMachine::new(&snapshot.id);

        let plan = self.plan(snapshot)?;
        let limiter = ConcurrencyLimiter::new(self.config.max_concurrency)?;
        info!(
            snapshot = %snapshot.id,
            batches = plan.len(),
            operations = plan.operation_count(),
            "planned snapshot write"
        );

        let mut aggregator = ResultAggregator::new(&plan);
        let (root, children) = plan.into_parts();
        let retry = RetryExecutor::new(
            self.config.retry.clone(),
            Arc::clone(&self.classifier),
            Arc::clone(&self.breaker),
        );
        let per_batch_timeout = self.config.per_batch_timeout;

        machine.transition(WriterState::RootPhase)?;
        let root_started = Instant::now();
        let root_result = retry
            .execute(0, &budget, || {
                commit_with_timeout(&*self.store, &root.ops, per_batch_timeout)
            })
            .await;
        let root_elapsed = root_started.elapsed();

        if !root_result.is_success() {
            let attempts = root_result.attempts;
            let reason = root_result
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown error".into());
            aggregator.record(root_result);
            aggregator.abort_pending();

            machine.transition(WriterState::Finalizing)?;
            let report = aggregator.finalize(PhaseTimings {
                root: root_elapsed,
                children: Duration::ZERO,
                total: budget.elapsed(),
            });
            machine.transition(WriterState::Done)?;

            error!(snapshot = %snapshot.id, attempts, reason = %reason, "root batch failed, snapshot not written");
            return Err(WriteError::RootFailed {
                attempts,
                reason,
                report: Box::new(report),
            });
        }
        aggregator.record(root_result);

        let children_started = Instant::now();
        if !children.is_empty() && budget.is_expired() {
            machine.transition(WriterState::Aborted)?;
            warn!(snapshot = %snapshot.id, batches = children.len(), "deadline passed after root batch");
            aggregator.abort_pending();
        } else {
            machine.transition(WriterState::ChildPhase)?;
            let (tx, rx) = mpsc::channel(children.len().max(1));
            let store = Arc::clone(&self.store);
            let dispatch = limiter.dispatch(children, budget, tx, move |batch| {
                let store = Arc::clone(&store);
                let retry = retry.clone();
                async move {
                    retry
                        .execute(batch.index, &budget, || {
                            commit_with_timeout(&*store, &batch.ops, per_batch_timeout)
                        })
                        .await
                }
            });
            let (stats, ()) = tokio::join!(dispatch, aggregator.collect(rx));
            if stats.aborted > 0 {
                warn!(snapshot = %snapshot.id, aborted = stats.aborted, "child batches aborted by deadline");
            }
        }
        let children_elapsed = children_started.elapsed();

        machine.transition(WriterState::Finalizing)?;
        let report = aggregator.finalize(PhaseTimings {
            root: root_elapsed,
            children: children_elapsed,
            total: budget.elapsed(),
        });
        machine.transition(WriterState::Done)?;
        debug_assert!(machine.state().is_terminal());

        info!(
            snapshot = %snapshot.id,
            status = %report.status(),
            succeeded = report.succeeded().len(),
            failed = report.failed().len(),
            aborted = report.aborted().len(),
            retries = report.total_retries(),
            total_ms = report.timings().total.as_millis() as u64,
            "snapshot write finished"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for SnapshotWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotWriter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// One commit call bounded by the per-batch timeout.
async fn commit_with_timeout(
    store: &dyn DocumentStore,
    ops: &[WriteOp],
    timeout: Duration,
) -> StoreResult<()> {
    match tokio::time::timeout(timeout, store.commit_batch(ops)).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::deadline_exceeded(format!(
            "commit of {} operations exceeded {:?}",
            ops.len(),
            timeout
        ))),
    }
}
