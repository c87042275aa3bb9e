//! Retry policy for mutating cloud calls.

use crate::config::Settings;
use crate::error::{CloudError, RetryError};
use colored::Colorize;
use std::future::Future;
use std::time::Duration;

/// Exponential backoff: `base_delay * 2^(attempt-1)`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

/// Successful value plus the number of attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.retry_attempts,
            settings.retry_delay,
            settings.retry_max_delay,
        )
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails permanently, or runs out of attempts.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<Attempted<T>, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CloudError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    })
                }
                Err(err) if !err.is_transient() => {
                    log::debug!("{label}: permanent failure on attempt {attempt}: {err}");
                    return Err(RetryError {
                        attempts: attempt,
                        exhausted: false,
                        last: err,
                    });
                }
                Err(err) if attempt >= self.max_attempts => {
                    log::error!(
                        "{label}: {} after {attempt} attempts: {err}",
                        "retries exhausted".red()
                    );
                    return Err(RetryError {
                        attempts: attempt,
                        exhausted: true,
                        last: err,
                    });
                }
                Err(err) => {
                    let delay = self.backoff(attempt);
                    log::warn!(
                        "{label}: transient failure on attempt {attempt}/{}, retrying in {delay:?}: {err}",
                        self.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn busy() -> CloudError {
        CloudError::http("create peering", 503, "busy")
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_secs(5), Duration::from_secs(60));
        assert_eq!(policy.backoff(1), Duration::from_secs(5));
        assert_eq!(policy.backoff(2), Duration::from_secs(10));
        assert_eq!(policy.backoff(3), Duration::from_secs(20));
        assert_eq!(policy.backoff(5), Duration::from_secs(60));
        assert_eq!(policy.backoff(40), Duration::from_secs(60));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::immediate(0).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = RetryPolicy::immediate(3)
            .execute("op", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(busy())
                } else {
                    Ok("done")
                }
            })
            .await
            .unwrap();
        assert_eq!(result.value, "done");
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn test_exhausted_transient_is_critical() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = RetryPolicy::immediate(3)
            .execute("op", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(busy())
            })
            .await
            .unwrap_err();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(err.attempts, 3);
        assert!(err.is_critical());
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = RetryPolicy::immediate(3)
            .execute("op", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(CloudError::http("create peering", 403, "denied"))
            })
            .await
            .unwrap_err();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(err.attempts, 1);
        assert!(!err.is_critical());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_slept() {
        let policy = RetryPolicy::new(3, Duration::from_secs(5), Duration::from_secs(60));
        let started = tokio::time::Instant::now();
        let _ = policy
            .execute("op", || async { Err::<(), _>(busy()) })
            .await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(15) && elapsed < Duration::from_secs(16));
    }
}
