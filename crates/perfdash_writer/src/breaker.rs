//! Circuit breaker hook.

use crate::classify::ErrorClass;

/// A circuit breaker consulted around every commit attempt.
///
/// The writer only passes information through: it asks before each attempt
/// and reports each outcome. Opening and closing policy belongs to the
/// implementation.
pub trait CircuitBreaker: Send + Sync {
    /// Returns false to reject the next attempt without calling the store.
    fn allow_request(&self) -> bool;

    /// Records a successful commit.
    fn record_success(&self);

    /// Records a failed commit and its classification.
    fn record_failure(&self, class: ErrorClass);
}

/// A breaker that always allows requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCircuitBreaker;

impl CircuitBreaker for NoopCircuitBreaker {
    fn allow_request(&self) -> bool {
        true
    }

    fn record_success(&self) {}

    fn record_failure(&self, _class: ErrorClass) {}
}
