//! # Retry Policy
//!
//! An explicit, injectable retry policy shared by the poll scheduler and the
//! drivers. Keeping the policy a plain value makes the backoff schedule
//! testable without any network I/O.

use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

/// Bounded-retry policy: `max_attempts` total attempts with jittered
/// exponential backoff between them, capped at `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// The backoff schedule: one delay per retry, so `max_attempts - 1` items.
    /// Delays double from `base_delay` and never exceed `max_delay` (jitter
    /// only shrinks them).
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let base_ms = self.base_delay.as_millis().max(1) as u64;
        ExponentialBackoff::from_millis(2)
            .factor(base_ms / 2)
            .max_delay(self.max_delay)
            .map(jitter)
            .take(self.max_attempts.saturating_sub(1))
    }

    /// Run `op` under this policy, returning the first success or the error
    /// of the final attempt.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        Retry::spawn(self.delays(), op).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(4),
        )
    }

    #[test]
    fn test_schedule_length_and_cap() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(250));
        let delays: Vec<Duration> = policy.delays().collect();
        assert_eq!(delays.len(), 4);
        for d in delays {
            assert!(d <= Duration::from_millis(250));
        }
    }

    #[test]
    fn test_single_attempt_has_no_delays() {
        let policy = fast_policy(1);
        assert_eq!(policy.delays().count(), 0);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error_after_all_attempts() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let result: Result<(), &str> = fast_policy(3)
            .run(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("upstream down")
                }
            })
            .await;
        assert_eq!(result.unwrap_err(), "upstream down");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_success_stops_retrying() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let result: Result<u32, &str> = fast_policy(5)
            .run(|| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                        Ok(42)
                    } else {
                        Err("flaky")
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
