//! A document store driven by per-batch scripts.
//!
//! Batches are addressed by the key of their first operation: the snapshot
//! id for the root batch, `<snapshot>/<child>` for child batches. Every
//! commit call is recorded with its start and end time so tests can check
//! ordering and concurrency.

use async_trait::async_trait;
use parking_lot::Mutex;
use perfdash_writer::{DocumentStore, MemoryStore, StoreError, StoreErrorCode, StoreResult, WriteOp};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// One recorded commit call.
#[derive(Debug, Clone)]
pub struct CommitCall {
    /// Key of the first operation in the batch.
    pub first_key: String,
    /// Number of operations committed.
    pub op_count: usize,
    /// When the call started.
    pub started_at: Instant,
    /// When the call returned.
    pub finished_at: Instant,
    /// Error code returned, `None` on success.
    pub error: Option<StoreErrorCode>,
}

impl CommitCall {
    /// Returns true if the call succeeded.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug)]
enum Script {
    /// Fail with these errors in order, then succeed.
    Sequence(VecDeque<StoreError>),
    /// Fail every call.
    Always(StoreError),
}

/// Scripted in-memory document store.
#[derive(Debug, Default)]
pub struct ScriptedStore {
    documents: MemoryStore,
    scripts: Mutex<HashMap<String, Script>>,
    latencies: Mutex<HashMap<String, Duration>>,
    default_latency: Mutex<Duration>,
    calls: Mutex<Vec<CommitCall>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedStore {
    /// Creates a store where every commit succeeds immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the batch starting at `first_key` fail with `errors` in order,
    /// then succeed.
    pub fn fail_then_succeed(&self, first_key: impl Into<String>, errors: Vec<StoreError>) {
        self.scripts
            .lock()
            .insert(first_key.into(), Script::Sequence(errors.into()));
    }

    /// Makes every commit of the batch starting at `first_key` fail.
    pub fn always_fail(&self, first_key: impl Into<String>, error: StoreError) {
        self.scripts
            .lock()
            .insert(first_key.into(), Script::Always(error));
    }

    /// Delays commits of the batch starting at `first_key`.
    pub fn set_latency(&self, first_key: impl Into<String>, latency: Duration) {
        self.latencies.lock().insert(first_key.into(), latency);
    }

    /// Delays every commit without a specific latency.
    pub fn set_default_latency(&self, latency: Duration) {
        *self.default_latency.lock() = latency;
    }

    /// All recorded calls in start order.
    pub fn calls(&self) -> Vec<CommitCall> {
        let mut calls = self.calls.lock().clone();
        calls.sort_by_key(|c| c.started_at);
        calls
    }

    /// Recorded calls for the batch starting at `first_key`.
    pub fn calls_for(&self, first_key: &str) -> Vec<CommitCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.first_key == first_key)
            .collect()
    }

    /// Total number of commit calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Highest number of commit calls observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Returns true if a document exists at `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.documents.contains(key)
    }

    /// Number of stored documents.
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    fn next_failure(&self, first_key: &str) -> Option<StoreError> {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(first_key)? {
            Script::Sequence(errors) => errors.pop_front(),
            Script::Always(error) => Some(error.clone()),
        }
    }

    fn latency_for(&self, first_key: &str) -> Duration {
        self.latencies
            .lock()
            .get(first_key)
            .copied()
            .unwrap_or_else(|| *self.default_latency.lock())
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn commit_batch(&self, ops: &[WriteOp]) -> StoreResult<()> {
        let started_at = Instant::now();
        let first_key = ops.first().map(WriteOp::key).unwrap_or_default();

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = self.latency_for(&first_key);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let result = match self.next_failure(&first_key) {
            Some(error) => Err(error),
            None => self.documents.commit_batch(ops).await,
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.calls.lock().push(CommitCall {
            first_key,
            op_count: ops.len(),
            started_at,
            finished_at: Instant::now(),
            error: result.as_ref().err().map(|e| e.code),
        });
        result
    }
}
