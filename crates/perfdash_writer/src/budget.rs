//! Whole-operation time budget.
//!
//! Cancellation is cooperative: the budget never interrupts a commit that is
//! already in flight. Callers check [`TimeoutBudget::is_expired`] before
//! starting new work and race [`TimeoutBudget::expired`] while waiting.

use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};

/// Deadlines further out than this are clamped.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

/// Tracks elapsed time against a fixed deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutBudget {
    started_at: Instant,
    deadline: Instant,
}

impl TimeoutBudget {
    /// Starts a budget of `total` from now.
    pub fn start(total: Duration) -> Self {
        let started_at = Instant::now();
        let deadline = started_at
            .checked_add(total.min(FAR_FUTURE))
            .unwrap_or(started_at);
        Self {
            started_at,
            deadline,
        }
    }

    /// Time since the budget started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Time left before the deadline, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Returns true once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Resolves when the deadline passes.
    pub async fn expired(&self) {
        sleep_until(self.deadline).await;
    }

    /// Sleeps for `delay` if it ends before the deadline.
    ///
    /// Returns false without sleeping when the deadline would pass first,
    /// so the caller can give up right away.
    pub async fn sleep(&self, delay: Duration) -> bool {
        if delay >= self.remaining() {
            return false;
        }
        sleep(delay).await;
        !self.is_expired()
    }
}
