//! Bounded exponential backoff around a single external call.
//!
//! Only transient errors are retried. When attempts run out, the last error
//! is returned as-is: retry exhaustion and a one-shot permanent failure have
//! the same type and differ only in the attempt count that was logged.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Classification hook for retry decisions.
pub trait Retryable {
    fn is_transient(&self) -> bool;

    /// Minimum wait the failing service asked for, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based): `initial * multiplier^(retry-1)`,
    /// clamped to `[initial_delay, max_delay]`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(self.initial_delay.as_secs_f64()))
    }

    /// Backoff before retry `retry`, stretched to a server hint but never
    /// past `max_delay`.
    pub fn backoff_for(&self, retry: u32, hint: Option<Duration>) -> Duration {
        let base = self.delay_for(retry);
        match hint {
            Some(h) if h > base => h.min(self.max_delay),
            _ => base,
        }
    }
}

/// Runs `call` until it succeeds, fails permanently, or `policy.max_attempts`
/// is reached. Sleeps between attempts are suspension points.
pub async fn retry_call<T, E, F, Fut>(policy: &RetryPolicy, op: &str, mut call: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let started = Instant::now();
        let result = call().await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(v) => {
                if attempt > 1 {
                    debug!(op, attempt, elapsed_ms, "call succeeded after retry");
                }
                return Ok(v);
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let backoff = policy.backoff_for(attempt, e.retry_after());
                warn!(
                    op,
                    error = %e,
                    attempt,
                    max_attempts,
                    elapsed_ms,
                    backoff_ms = backoff.as_millis() as u64,
                    "transient failure, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    warn!(op, error = %e, attempt, elapsed_ms, "retries exhausted");
                } else {
                    debug!(op, error = %e, attempt, elapsed_ms, "permanent failure");
                }
                return Err(e);
            }
        }
    }
}
