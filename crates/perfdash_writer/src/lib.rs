//! # PerfDash Snapshot Writer
//!
//! Persists performance-data snapshots to a remote document store.
//!
//! A snapshot is one root manifest plus on the order of a hundred child
//! records. The store caps the number of operations per commit and enforces
//! a deadline shorter than a naive sequential write, so this crate provides:
//! - Deterministic batch planning under a per-commit operation limit
//! - Classified retry with exponential backoff and jitter
//! - Bounded parallel dispatch of child batches
//! - A whole-write time budget with cooperative cancellation
//! - Per-batch and per-child outcome reporting
//!
//! ## Architecture
//!
//! The writer implements a **root-then-children** model:
//! 1. Plan batches; batch 0 holds the root plus leading children
//! 2. Commit batch 0, retrying transient errors
//! 3. Dispatch the remaining batches, `max_concurrency` at a time
//! 4. Fold every batch result into a [`WriteReport`]
//!
//! ## Key Invariants
//!
//! - Every child lands in exactly one batch, in input order
//! - No child batch starts before the root batch has finished
//! - A failed root means no child batch is attempted
//! - The deadline never interrupts a commit already in flight
//! - Partial writes are reported, not raised

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod aggregator;
mod breaker;
mod budget;
mod classify;
mod config;
mod error;
mod limiter;
mod model;
mod planner;
mod report;
mod retry;
mod state;
mod store;
mod writer;

pub use aggregator::ResultAggregator;
pub use breaker::{CircuitBreaker, NoopCircuitBreaker};
pub use budget::TimeoutBudget;
pub use classify::{DefaultClassifier, ErrorClass, ErrorClassifier, RateLimitAwareClassifier};
pub use config::{RetryConfig, WriterConfig};
pub use error::{ConfigError, WriteError, WriteResult};
pub use limiter::{ConcurrencyLimiter, DispatchStats};
pub use model::{ChildRecord, Snapshot, WriteBatch, WriteOp};
pub use planner::{BatchPlan, BatchPlanner};
pub use report::{BatchOutcome, BatchResult, PhaseTimings, WriteReport, WriteStatus};
pub use retry::{RetryExecutor, RetryState};
pub use state::WriterState;
pub use store::{
    DocumentStore, MemoryStore, StoreError, StoreErrorCode, StoreResult,
    DEFAULT_MEMORY_COMMIT_LIMIT,
};
pub use writer::SnapshotWriter;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
