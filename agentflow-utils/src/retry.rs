//! ABOUTME: Retry with exponential backoff and jitter for transient failures
//! ABOUTME: Callers classify errors as retriable or not via the RetryClass trait

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Classification of an error for retry purposes.
///
/// Retriable errors (timeouts, connection resets) trigger another attempt;
/// everything else aborts the retry loop immediately.
pub trait RetryClass {
    fn is_retriable(&self) -> bool;
}

/// Backoff schedule for [`retry`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Base for the exponential schedule.
    pub exponential_base: f64,
    /// Multiply each delay by uniform(0.5, 1.5) to avoid thundering herds.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after a failed `attempt` (1-based).
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.exponential_base.powi(attempt.saturating_sub(1) as i32);
        let raw = self.initial_delay.as_secs_f64() * exp;
        let capped = raw.min(self.max_delay.as_secs_f64());
        let factor = if self.jitter {
            rand::thread_rng().gen_range(0.5..1.5)
        } else {
            1.0
        };
        Duration::from_secs_f64(capped * factor)
    }
}

/// Error returned by [`retry`].
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// All attempts failed with retriable errors; wraps the last cause.
    #[error("failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    /// A non-retriable error aborted the loop.
    #[error(transparent)]
    Aborted(E),
}

impl<E> RetryError<E> {
    /// The underlying error, regardless of how the loop ended.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Aborted(e) => e,
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// The operation receives the 1-based attempt number. Success on a later
/// attempt logs a recovery line; the final attempt never sleeps afterwards.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, RetryError<E>>
where
    E: RetryClass + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last: Option<E> = None;

    for attempt in 1..=attempts {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retriable() => {
                error!(attempt, error = %e, "non-retriable error, aborting retries");
                return Err(RetryError::Aborted(e));
            }
            Err(e) => {
                if attempt < attempts {
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                } else {
                    error!(attempts, error = %e, "all retry attempts failed");
                }
                last = Some(e);
            }
        }
    }

    Err(RetryError::Exhausted {
        attempts,
        // max_attempts >= 1, so at least one error was recorded
        last: last.expect("retry loop ran at least once"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestError {
        retriable: bool,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test error (retriable: {})", self.retriable)
        }
    }

    impl RetryClass for TestError {
        fn is_retriable(&self) -> bool {
            self.retriable
        }
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts: attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            exponential_base: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<u32, RetryError<TestError>> = retry(&fast_policy(3), move |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<&str, RetryError<TestError>> = retry(&fast_policy(3), move |_| {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError { retriable: true })
                } else {
                    Ok("recovered")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_wraps_last_error() {
        let result: Result<(), RetryError<TestError>> = retry(&fast_policy(3), |_| async {
            Err(TestError { retriable: true })
        })
        .await;
        match result {
            Err(RetryError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_retriable_aborts_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), RetryError<TestError>> = retry(&fast_policy(5), move |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(TestError { retriable: false })
            }
        })
        .await;
        assert!(matches!(result, Err(RetryError::Aborted(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_schedule_without_jitter() {
        // attempts=3, initial=1s, base=2, no jitter: sleeps 1s + 2s = 3s total;
        // the final attempt does not sleep afterwards.
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: false,
        };
        let start = tokio::time::Instant::now();
        let result: Result<(), RetryError<TestError>> = retry(&policy, |_| async {
            Err(TestError { retriable: true })
        })
        .await;
        assert!(result.is_err());
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_capped_at_max() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(15),
            exponential_base: 2.0,
            jitter: false,
        };
        // Sleeps: 10 + 15 (capped from 20) + 15 (capped from 40) = 40s.
        let start = tokio::time::Instant::now();
        let _: Result<(), RetryError<TestError>> = retry(&policy, |_| async {
            Err(TestError { retriable: true })
        })
        .await;
        assert_eq!(start.elapsed(), Duration::from_secs(40));
    }
}
