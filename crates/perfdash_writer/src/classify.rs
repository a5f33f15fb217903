//! Store error classification.

use crate::store::{StoreError, StoreErrorCode};
use serde::Serialize;

/// Retry decision for a failed commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Transient; the attempt may be repeated.
    Retryable,
    /// Permanent; the batch fails immediately.
    Fatal,
}

/// Maps store errors to retry decisions.
///
/// Injected into the writer so the retry logic never depends on a specific
/// store's error representation. Any `Fn(&StoreError) -> ErrorClass` closure
/// is a classifier.
pub trait ErrorClassifier: Send + Sync {
    /// Classifies one error.
    fn classify(&self, error: &StoreError) -> ErrorClass;
}

impl<F> ErrorClassifier for F
where
    F: Fn(&StoreError) -> ErrorClass + Send + Sync,
{
    fn classify(&self, error: &StoreError) -> ErrorClass {
        self(error)
    }
}

/// Retries deadline-exceeded, unavailable, internal and aborted; everything
/// else is fatal.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl ErrorClassifier for DefaultClassifier {
    fn classify(&self, error: &StoreError) -> ErrorClass {
        if error.code.is_transient() {
            ErrorClass::Retryable
        } else {
            ErrorClass::Fatal
        }
    }
}

/// Like [`DefaultClassifier`] but also retries `resource-exhausted`, for
/// stores that signal rate limiting that way.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimitAwareClassifier;

impl ErrorClassifier for RateLimitAwareClassifier {
    fn classify(&self, error: &StoreError) -> ErrorClass {
        match error.code {
            StoreErrorCode::ResourceExhausted => ErrorClass::Retryable,
            _ => DefaultClassifier.classify(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_classification() {
        let classifier = DefaultClassifier;
        let retryable = [
            StoreErrorCode::DeadlineExceeded,
            StoreErrorCode::Unavailable,
            StoreErrorCode::Internal,
            StoreErrorCode::Aborted,
        ];
        for code in retryable {
            assert_eq!(
                classifier.classify(&StoreError::new(code, "x")),
                ErrorClass::Retryable
            );
        }

        let fatal = [
            StoreErrorCode::PermissionDenied,
            StoreErrorCode::InvalidArgument,
            StoreErrorCode::ResourceExhausted,
            StoreErrorCode::Unauthenticated,
            StoreErrorCode::CircuitOpen,
            StoreErrorCode::Unknown,
        ];
        for code in fatal {
            assert_eq!(
                classifier.classify(&StoreError::new(code, "x")),
                ErrorClass::Fatal
            );
        }
    }

    #[test]
    fn rate_limit_aware_classification() {
        let classifier = RateLimitAwareClassifier;
        assert_eq!(
            classifier.classify(&StoreError::new(StoreErrorCode::ResourceExhausted, "slow down")),
            ErrorClass::Retryable
        );
        assert_eq!(
            classifier.classify(&StoreError::permission_denied("no")),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn closure_classifier() {
        let everything_fatal = |_: &StoreError| ErrorClass::Fatal;
        assert_eq!(
            everything_fatal.classify(&StoreError::unavailable("down")),
            ErrorClass::Fatal
        );
    }
}
