//! Document store abstraction.

use crate::model::WriteOp;
use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Status codes surfaced by a document store.
///
/// These mirror the gRPC status space most document stores report through.
/// The writer never interprets them directly; an
/// [`ErrorClassifier`](crate::ErrorClassifier) maps them to retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorCode {
    /// The call did not finish before its deadline.
    DeadlineExceeded,
    /// The service is temporarily unreachable.
    Unavailable,
    /// The service hit an internal error.
    Internal,
    /// The commit was aborted, typically by contention.
    Aborted,
    /// The caller may not write these documents.
    PermissionDenied,
    /// The request was malformed.
    InvalidArgument,
    /// A referenced document does not exist.
    NotFound,
    /// A document that must not exist already does.
    AlreadyExists,
    /// A quota or rate limit was hit.
    ResourceExhausted,
    /// The store is not in a state to accept the request.
    FailedPrecondition,
    /// Missing or invalid credentials.
    Unauthenticated,
    /// The request was cancelled by the client.
    Cancelled,
    /// A circuit breaker rejected the call before it reached the store.
    CircuitOpen,
    /// Anything else.
    Unknown,
}

impl StoreErrorCode {
    /// Returns true for the transient codes: deadline-exceeded, unavailable,
    /// internal and aborted.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreErrorCode::DeadlineExceeded
                | StoreErrorCode::Unavailable
                | StoreErrorCode::Internal
                | StoreErrorCode::Aborted
        )
    }

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreErrorCode::DeadlineExceeded => "deadline-exceeded",
            StoreErrorCode::Unavailable => "unavailable",
            StoreErrorCode::Internal => "internal",
            StoreErrorCode::Aborted => "aborted",
            StoreErrorCode::PermissionDenied => "permission-denied",
            StoreErrorCode::InvalidArgument => "invalid-argument",
            StoreErrorCode::NotFound => "not-found",
            StoreErrorCode::AlreadyExists => "already-exists",
            StoreErrorCode::ResourceExhausted => "resource-exhausted",
            StoreErrorCode::FailedPrecondition => "failed-precondition",
            StoreErrorCode::Unauthenticated => "unauthenticated",
            StoreErrorCode::Cancelled => "cancelled",
            StoreErrorCode::CircuitOpen => "circuit-open",
            StoreErrorCode::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error reported by a commit call.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{code}: {message}")]
pub struct StoreError {
    /// Status code.
    pub code: StoreErrorCode,
    /// Human-readable detail.
    pub message: String,
}

impl StoreError {
    /// Creates a new store error.
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates a deadline-exceeded error.
    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::DeadlineExceeded, message)
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Unavailable, message)
    }

    /// Creates a permission-denied error.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::PermissionDenied, message)
    }

    /// Creates an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::InvalidArgument, message)
    }

    /// Creates a circuit-open error.
    pub fn circuit_open() -> Self {
        Self::new(StoreErrorCode::CircuitOpen, "circuit breaker is open")
    }
}

/// A document store that commits batches of writes atomically.
///
/// Implementations wrap the actual client (Firestore, DynamoDB, an HTTP
/// service, ...). The writer only relies on this contract:
///
/// - a successful commit applied every operation in `ops`
/// - a failed commit applied none of them
/// - writing the same key twice overwrites, so retries are idempotent
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Commits all operations in one call.
    async fn commit_batch(&self, ops: &[WriteOp]) -> StoreResult<()>;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<S> {
    async fn commit_batch(&self, ops: &[WriteOp]) -> StoreResult<()> {
        (**self).commit_batch(ops).await
    }
}

/// Default per-commit operation limit of [`MemoryStore`].
pub const DEFAULT_MEMORY_COMMIT_LIMIT: usize = 500;

/// An in-memory document store.
///
/// Commits are atomic and overwrite existing keys. Latency and random
/// failures can be injected to exercise the write pipeline.
#[derive(Debug)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, Value>>,
    max_ops_per_commit: usize,
    latency: Option<Duration>,
    failure_rate: f64,
    failure_code: StoreErrorCode,
    commits: AtomicU64,
    rejected: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty store with the default commit limit.
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            max_ops_per_commit: DEFAULT_MEMORY_COMMIT_LIMIT,
            latency: None,
            failure_rate: 0.0,
            failure_code: StoreErrorCode::Unavailable,
            commits: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Sets the maximum number of operations accepted per commit.
    #[must_use]
    pub fn with_commit_limit(mut self, limit: usize) -> Self {
        self.max_ops_per_commit = limit;
        self
    }

    /// Delays every commit by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fails each commit with probability `rate` using `code`.
    #[must_use]
    pub fn with_failure_rate(mut self, rate: f64, code: StoreErrorCode) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self.failure_code = code;
        self
    }

    /// Returns the stored document at `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.documents.read().get(key).cloned()
    }

    /// Returns true if a document exists at `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.documents.read().contains_key(key)
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns true if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Number of commits applied successfully.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of commits rejected, including injected failures.
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::SeqCst)
    }

    fn reject(&self, error: StoreError) -> StoreResult<()> {
        self.rejected.fetch_add(1, Ordering::SeqCst);
        Err(error)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn commit_batch(&self, ops: &[WriteOp]) -> StoreResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if ops.len() > self.max_ops_per_commit {
            return self.reject(StoreError::invalid_argument(format!(
                "commit carries {} operations, limit is {}",
                ops.len(),
                self.max_ops_per_commit
            )));
        }

        let injected = self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate);
        if injected {
            return self.reject(StoreError::new(
                self.failure_code,
                "injected failure",
            ));
        }

        let mut documents = self.documents.write();
        for op in ops {
            documents.insert(op.key(), op.document().clone());
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
