//! Configuration for the snapshot writer.

use crate::error::ConfigError;
use rand::Rng;
use std::time::Duration;

/// Configuration for a snapshot write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriterConfig {
    /// Maximum number of operations committed in one store call.
    pub max_batch_size: usize,
    /// Maximum number of non-root batches in flight at once.
    pub max_concurrency: usize,
    /// Timeout applied to each individual commit call.
    pub per_batch_timeout: Duration,
    /// Deadline for the whole write, measured from the start of `write`.
    pub total_timeout: Duration,
    /// Retry configuration applied to every batch.
    pub retry: RetryConfig,
}

impl WriterConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum batch size.
    #[must_use]
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Sets the maximum number of concurrent child batches.
    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit;
        self
    }

    /// Sets the per-commit timeout.
    #[must_use]
    pub fn with_per_batch_timeout(mut self, timeout: Duration) -> Self {
        self.per_batch_timeout = timeout;
        self
    }

    /// Sets the whole-operation deadline.
    #[must_use]
    pub fn with_total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = timeout;
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Checks every option, returning the first violation found.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the offending option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.per_batch_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                name: "per_batch_timeout",
            });
        }
        if self.total_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                name: "total_timeout",
            });
        }
        self.retry.validate()
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 50,
            max_concurrency: 3,
            per_batch_timeout: Duration::from_secs(30),
            total_timeout: Duration::from_secs(5 * 60),
            retry: RetryConfig::default(),
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_backoff: Duration,
    /// Upper bound on any single delay, before jitter.
    pub max_backoff: Duration,
    /// Half-width of the multiplicative jitter range.
    pub jitter_factor: f64,
}

impl RetryConfig {
    /// Creates a retry configuration with the given retry count.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            jitter_factor: 0.2,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter_factor: 0.0,
        }
    }

    /// Sets the base backoff.
    #[must_use]
    pub fn with_base_backoff(mut self, delay: Duration) -> Self {
        self.base_backoff = delay;
        self
    }

    /// Sets the maximum backoff.
    #[must_use]
    pub fn with_max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Sets the jitter factor.
    #[must_use]
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    /// Total attempts a batch may make, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Pre-jitter delay before retry `retry` (1-based).
    ///
    /// `min(base_backoff * 2^(retry-1), max_backoff)`; retry 0 has no delay.
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let factor = 2u32.saturating_pow(retry - 1);
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_backoff)
    }

    /// Delay before retry `retry` with multiplicative jitter applied.
    ///
    /// The result lies in `[d * (1 - f), d * (1 + f)]` where `d` is
    /// [`delay_for_attempt`](Self::delay_for_attempt) and `f` the jitter factor.
    /// A factor that is not a positive number disables jitter; factors above
    /// 1 are treated as 1.
    pub fn jittered_delay(&self, retry: u32) -> Duration {
        let delay = self.delay_for_attempt(retry);
        let factor = self.jitter_factor;
        if factor.is_nan() || factor <= 0.0 || delay.is_zero() {
            return delay;
        }

        let factor = factor.min(1.0);
        let low = 1.0 - factor;
        let high = 1.0 + factor;
        let scale = rand::thread_rng().gen_range(low..=high);
        Duration::try_from_secs_f64(delay.as_secs_f64() * scale).unwrap_or(delay)
    }

    /// Checks the backoff bounds and the jitter factor.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BackoffBounds`] or [`ConfigError::JitterFactor`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_backoff > self.max_backoff {
            return Err(ConfigError::BackoffBounds {
                base_ms: self.base_backoff.as_millis(),
                max_ms: self.max_backoff.as_millis(),
            });
        }
        if !(0.0..1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::JitterFactor(self.jitter_factor));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}
