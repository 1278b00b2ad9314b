//! Bounded retries with exponential backoff and jitter around fetch attempts.
//!
//! Exhaustion is an ordinary per-location outcome, never a process-level
//! error: the location is simply skipped for the current cycle.

use rand::Rng;
use std::{future::Future, time::Duration};
use thiserror::Error;

use crate::fetch::FetchError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
pub const DEFAULT_JITTER_MS: u64 = 250;

/// All attempts failed; carries the last error for diagnostics.
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempts: {last_error}")]
pub struct RetriesExhausted {
    pub attempts: u32,
    #[source]
    pub last_error: FetchError,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total tries per location per cycle, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent failure.
    pub base_delay: Duration,
    /// Ceiling for the deterministic part of the delay.
    pub max_delay: Duration,
    /// Upper bound of the random jitter added on top of each delay.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter: Duration::from_millis(DEFAULT_JITTER_MS),
        }
    }
}

impl RetryPolicy {
    /// Deterministic backoff for the given 0-based failed-attempt index:
    /// `base * 2^attempt`, capped at `max_delay`. Non-decreasing in
    /// `attempt`; jitter is added separately.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as u64))
    }

    fn jittered_delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        self.base_delay_for_attempt(attempt) + jitter
    }
}

/// Run `operation` up to `policy.max_attempts` times, sleeping between
/// failures. Returns the first success, or [`RetriesExhausted`] wrapping the
/// last error once the budget is spent.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T, RetriesExhausted>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..max_attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(attempt = attempt + 1, "fetch succeeded after retrying");
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt + 1 < max_attempts {
                    let delay = policy.jittered_delay_for_attempt(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "fetch attempt failed; backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(err);
            }
        }
    }

    // The loop runs at least once, so an error is always recorded here.
    let last_error = last_error.unwrap_or_else(|| {
        FetchError::NetworkUnavailable("no fetch attempt was made".to_string())
    });

    Err(RetriesExhausted { attempts: max_attempts, last_error })
}
