//! Exponential-backoff retry for async operations.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Attempt budget and base delay for [`with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. 0 is treated as 1.
    pub max_retries: u32,
    /// Delay after the first failure; doubles after each further failure.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// One attempt, no waiting.
    pub fn single_attempt() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay after failed attempt `attempt` (1-based): `base_delay * 2^(attempt-1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        with_retry(operation, self.max_retries, self.base_delay).await
    }
}

/// Calls `operation` up to `max_retries` times, sleeping
/// `base_delay * 2^(attempt-1)` after each failed attempt except the last.
/// Returns the last error when every attempt fails.
pub async fn with_retry<T, E, F, Fut>(
    mut operation: F,
    max_retries: u32,
    base_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let policy = RetryPolicy::new(max_retries.max(1), base_delay);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= policy.max_retries => {
                if policy.max_retries > 1 {
                    tracing::warn!("Operation failed after {} attempts: {}", attempt, e);
                }
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                tracing::debug!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after failure: {}",
                    e
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
