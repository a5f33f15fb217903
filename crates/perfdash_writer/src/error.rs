//! Error types for the snapshot writer.

use crate::report::WriteReport;
use thiserror::Error;

/// Result type for writer operations.
pub type WriteResult<T> = Result<T, WriteError>;

/// Hard errors surfaced by [`crate::SnapshotWriter::write`].
///
/// Only configuration problems and an unrecovered root batch are reported
/// this way. Child batch failures and timeout aborts are encoded in the
/// returned [`WriteReport`] instead.
#[derive(Error, Debug)]
pub enum WriteError {
    /// The writer configuration is invalid. No store call was made.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The snapshot itself cannot be planned. No store call was made.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// The root batch failed after retries; no child batch was attempted.
    #[error("root batch failed after {attempts} attempt(s): {reason}")]
    RootFailed {
        /// Attempts spent on the root batch.
        attempts: u32,
        /// Last error reported for the root batch.
        reason: String,
        /// The final report, with status `Failed`.
        report: Box<WriteReport>,
    },

    /// Invalid writer state transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl WriteError {
    /// Returns the report attached to a root failure, if any.
    pub fn report(&self) -> Option<&WriteReport> {
        match self {
            WriteError::RootFailed { report, .. } => Some(report.as_ref()),
            _ => None,
        }
    }

    /// Consumes the error and returns the attached report, if any.
    pub fn into_report(self) -> Option<WriteReport> {
        match self {
            WriteError::RootFailed { report, .. } => Some(*report),
            _ => None,
        }
    }
}

/// Configuration validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// `max_batch_size` must allow at least the root write.
    #[error("max_batch_size must be at least 1")]
    ZeroBatchSize,

    /// `max_concurrency` must allow at least one batch in flight.
    #[error("max_concurrency must be at least 1")]
    ZeroConcurrency,

    /// A timeout was configured as zero.
    #[error("{name} must be greater than zero")]
    ZeroTimeout {
        /// Option name.
        name: &'static str,
    },

    /// `base_backoff` is larger than `max_backoff`.
    #[error("base_backoff ({base_ms}ms) exceeds max_backoff ({max_ms}ms)")]
    BackoffBounds {
        /// Configured base backoff in milliseconds.
        base_ms: u128,
        /// Configured max backoff in milliseconds.
        max_ms: u128,
    },

    /// Jitter factor outside `[0, 1)`.
    #[error("jitter_factor must be in [0, 1), got {0}")]
    JitterFactor(f64),
}
