//! Classified retry with exponential backoff.

use crate::breaker::CircuitBreaker;
use crate::budget::TimeoutBudget;
use crate::classify::{ErrorClass, ErrorClassifier};
use crate::config::RetryConfig;
use crate::report::BatchResult;
use crate::store::{StoreError, StoreResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Bookkeeping for one batch's attempt sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryState {
    /// Attempts started so far.
    pub attempts: u32,
    /// Classification of the most recent failure.
    pub last_class: Option<ErrorClass>,
    /// Delay chosen before the next attempt.
    pub next_delay: Duration,
}

/// Runs a commit until it succeeds, fails fatally, runs out of retries or
/// the budget expires.
///
/// An attempt that is already running is never interrupted. The budget is
/// only consulted between attempts, so the result of the last attempt
/// always stands.
#[derive(Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    classifier: Arc<dyn ErrorClassifier>,
    breaker: Arc<dyn CircuitBreaker>,
}

impl RetryExecutor {
    /// Creates an executor.
    pub fn new(
        config: RetryConfig,
        classifier: Arc<dyn ErrorClassifier>,
        breaker: Arc<dyn CircuitBreaker>,
    ) -> Self {
        Self {
            config,
            classifier,
            breaker,
        }
    }

    /// Executes `commit` for batch `index`, retrying per the configuration.
    pub async fn execute<F, Fut>(
        &self,
        index: usize,
        budget: &TimeoutBudget,
        mut commit: F,
    ) -> BatchResult
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<()>>,
    {
        let started = Instant::now();
        let mut state = RetryState::default();

        loop {
            if !self.breaker.allow_request() {
                warn!(batch = index, attempt = state.attempts + 1, "circuit open, giving up on batch");
                return BatchResult::failed(
                    index,
                    state.attempts,
                    started.elapsed(),
                    StoreError::circuit_open(),
                    ErrorClass::Fatal,
                );
            }

            state.attempts += 1;
            debug!(batch = index, attempt = state.attempts, "committing batch");

            let error = match commit().await {
                Ok(()) => {
                    self.breaker.record_success();
                    debug!(batch = index, attempt = state.attempts, "batch committed");
                    return BatchResult::success(index, state.attempts, started.elapsed());
                }
                Err(error) => error,
            };

            let class = self.classifier.classify(&error);
            self.breaker.record_failure(class);
            state.last_class = Some(class);

            if class == ErrorClass::Fatal {
                warn!(batch = index, attempt = state.attempts, error = %error, "fatal store error");
                return BatchResult::failed(index, state.attempts, started.elapsed(), error, class);
            }

            if state.attempts >= self.config.max_attempts() {
                warn!(batch = index, attempts = state.attempts, error = %error, "retries exhausted");
                return BatchResult::failed(index, state.attempts, started.elapsed(), error, class);
            }

            state.next_delay = self.config.jittered_delay(state.attempts);
            warn!(
                batch = index,
                attempt = state.attempts,
                delay_ms = state.next_delay.as_millis() as u64,
                error = %error,
                "retrying batch"
            );

            if !budget.sleep(state.next_delay).await {
                warn!(batch = index, attempts = state.attempts, "deadline reached before retry");
                return BatchResult::failed(index, state.attempts, started.elapsed(), error, class);
            }
        }
    }
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::NoopCircuitBreaker;
    use crate::classify::DefaultClassifier;
    use crate::report::BatchOutcome;
    use crate::store::StoreErrorCode;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn executor(config: RetryConfig) -> RetryExecutor {
        RetryExecutor::new(config, Arc::new(DefaultClassifier), Arc::new(NoopCircuitBreaker))
    }

    fn exact() -> RetryConfig {
        RetryConfig::new(3).with_jitter_factor(0.0)
    }

    fn scripted(
        script: Vec<StoreResult<()>>,
    ) -> impl FnMut() -> std::future::Ready<StoreResult<()>> {
        let mut script = VecDeque::from(script);
        move || std::future::ready(script.pop_front().unwrap_or(Ok(())))
    }

    fn long_budget() -> TimeoutBudget {
        TimeoutBudget::start(Duration::from_secs(600))
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success() {
        let result = executor(exact())
            .execute(0, &long_budget(), scripted(vec![Ok(())]))
            .await;

        assert_eq!(result.outcome, BatchOutcome::Success);
        assert_eq!(result.attempts, 1);
        assert!(result.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_errors_then_success() {
        let started = Instant::now();
        let result = executor(exact())
            .execute(
                3,
                &long_budget(),
                scripted(vec![
                    Err(StoreError::unavailable("down")),
                    Err(StoreError::deadline_exceeded("slow")),
                    Err(StoreError::new(StoreErrorCode::Aborted, "contention")),
                    Ok(()),
                ]),
            )
            .await;

        assert_eq!(result.index, 3);
        assert_eq!(result.outcome, BatchOutcome::Success);
        assert_eq!(result.attempts, 4);
        // 1s + 2s + 4s of backoff
        assert!(started.elapsed() >= Duration::from_secs(7));
        assert!(result.duration >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_one_plus_max_retries() {
        let calls = AtomicU32::new(0);
        let result = executor(exact())
            .execute(1, &long_budget(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err(StoreError::new(StoreErrorCode::Internal, "boom")))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(result.outcome, BatchOutcome::Failed);
        assert_eq!(result.attempts, 4);
        assert_eq!(result.error_class, Some(ErrorClass::Retryable));
        assert_eq!(result.error.unwrap().code, StoreErrorCode::Internal);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_is_not_retried() {
        let result = executor(exact())
            .execute(
                0,
                &long_budget(),
                scripted(vec![Err(StoreError::permission_denied("nope")), Ok(())]),
            )
            .await;

        assert_eq!(result.outcome, BatchOutcome::Failed);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.error_class, Some(ErrorClass::Fatal));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_delays_stay_within_jitter_bounds() {
        let config = RetryConfig::new(4);
        let stamps = Mutex::new(Vec::new());
        executor(config.clone())
            .execute(0, &long_budget(), || {
                stamps.lock().push(Instant::now());
                std::future::ready(Err(StoreError::unavailable("down")))
            })
            .await;

        let stamps = stamps.into_inner();
        assert_eq!(stamps.len(), 5);
        for (k, pair) in stamps.windows(2).enumerate() {
            let gap = pair[1] - pair[0];
            let nominal = config.delay_for_attempt(k as u32 + 1);
            assert!(gap >= nominal.mul_f64(0.8), "gap {gap:?} below {nominal:?}");
            assert!(
                gap <= nominal.mul_f64(1.2) + Duration::from_millis(2),
                "gap {gap:?} above {nominal:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn budget_expiry_stops_retrying() {
        let budget = TimeoutBudget::start(Duration::from_millis(1500));
        let calls = AtomicU32::new(0);
        let result = executor(exact())
            .execute(2, &budget, || {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err(StoreError::unavailable("down")))
            })
            .await;

        // attempt at t=0, retry at t=1s, next delay of 2s crosses the deadline
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.outcome, BatchOutcome::Failed);
        assert_eq!(result.attempts, 2);
        assert!(result.duration >= Duration::from_secs(1));
        assert!(result.duration < Duration::from_millis(1500));
        assert!(!budget.is_expired());
    }

    struct RejectingBreaker;

    impl CircuitBreaker for RejectingBreaker {
        fn allow_request(&self) -> bool {
            false
        }
        fn record_success(&self) {}
        fn record_failure(&self, _class: ErrorClass) {}
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_skips_the_store() {
        let executor = RetryExecutor::new(
            exact(),
            Arc::new(DefaultClassifier),
            Arc::new(RejectingBreaker),
        );
        let calls = AtomicU32::new(0);
        let result = executor
            .execute(0, &long_budget(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Ok(()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.outcome, BatchOutcome::Failed);
        assert_eq!(result.attempts, 0);
        assert_eq!(result.error.unwrap().code, StoreErrorCode::CircuitOpen);
    }

    #[derive(Default)]
    struct CountingBreaker {
        successes: AtomicU32,
        failures: AtomicU32,
    }

    impl CircuitBreaker for CountingBreaker {
        fn allow_request(&self) -> bool {
            true
        }
        fn record_success(&self) {
            self.successes.fetch_add(1, Ordering::SeqCst);
        }
        fn record_failure(&self, _class: ErrorClass) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_is_informed_of_every_outcome() {
        let breaker = Arc::new(CountingBreaker::default());
        let executor = RetryExecutor::new(exact(), Arc::new(DefaultClassifier), breaker.clone());
        executor
            .execute(
                0,
                &long_budget(),
                scripted(vec![Err(StoreError::unavailable("down")), Ok(())]),
            )
            .await;

        assert_eq!(breaker.failures.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.successes.load(Ordering::SeqCst), 1);
    }
}
