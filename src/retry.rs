//! Bounded polling with a fixed inter-attempt delay.
//!
//! Suspension happens only between attempts. A deadline is compared against
//! elapsed wall-clock time after each attempt; an in-flight attempt is never
//! interrupted.

use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};

/// How many times, how often, and for how long to poll.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, or `None` for unbounded.
    pub max_attempts: Option<u32>,
    /// Delay between consecutive attempts.
    pub interval: Duration,
    /// Overall budget measured from the first attempt, or `None`.
    pub deadline: Option<Duration>,
}

impl RetryPolicy {
    /// Polls at most `max_attempts` times, waiting `interval` in between.
    #[must_use]
    pub const fn attempts(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            interval,
            deadline: None,
        }
    }

    /// Polls until `deadline` has elapsed, waiting `interval` in between.
    #[must_use]
    pub const fn deadline(deadline: Duration, interval: Duration) -> Self {
        Self {
            max_attempts: None,
            interval,
            deadline: Some(deadline),
        }
    }

    fn attempts_exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }

    fn deadline_passed(&self, started: Instant) -> bool {
        self.deadline
            .is_some_and(|deadline| started.elapsed() >= deadline)
    }
}

/// Raised when a poll ends without a value.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[error("gave up after {attempts} attempts ({} s elapsed)", elapsed.as_secs())]
pub struct RetryExhausted {
    /// Attempts made.
    pub attempts: u32,
    /// Time spent polling.
    pub elapsed: Duration,
}

/// Calls `attempt` with 1-based attempt numbers until it yields a value or
/// `policy` is exhausted.
///
/// # Errors
///
/// Returns [`RetryExhausted`] when no attempt produced a value.
pub async fn poll<T, F>(policy: &RetryPolicy, mut attempt: F) -> Result<T, RetryExhausted>
where
    F: FnMut(u32) -> Option<T>,
{
    let started = Instant::now();
    let mut made: u32 = 0;

    loop {
        made = made.saturating_add(1);
        if let Some(value) = attempt(made) {
            return Ok(value);
        }

        if policy.attempts_exhausted(made) || policy.deadline_passed(started) {
            break;
        }

        tracing::debug!(
            attempt = made,
            delay_secs = policy.interval.as_secs(),
            "not ready, retrying"
        );
        sleep(policy.interval).await;

        if policy.deadline_passed(started) {
            break;
        }
    }

    Err(RetryExhausted {
        attempts: made,
        elapsed: started.elapsed(),
    })
}
