//! Fixed-delay retry for transient failures.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Retry limits for a single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Pause before every retry.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed with a transient error; holds the last one.
    Exhausted { attempts: u32, last: E },
    /// A non-transient error ended the loop early.
    Fatal(E),
}

/// Run `operation` until it succeeds, fails with an error `is_transient`
/// rejects, or the policy's attempts are used up.
pub async fn retry_fixed<T, E, F, Fut, P>(
    policy: RetryPolicy,
    operation_name: &str,
    mut operation: F,
    is_transient: P,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !is_transient(&e) => return Err(RetryError::Fatal(e)),
            Err(e) if attempt >= max_attempts => {
                warn!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %e,
                    "Giving up after transient failures"
                );
                return Err(RetryError::Exhausted { attempts: attempt, last: e });
            }
            Err(e) => {
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    error = %e,
                    delay_ms = policy.delay.as_millis() as u64,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Transient,
        Fatal,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    fn transient(e: &TestError) -> bool {
        matches!(e, TestError::Transient)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_fixed(
            RetryPolicy::new(3, Duration::from_secs(10)),
            "test",
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(TestError::Transient)
                    } else {
                        Ok(attempt)
                    }
                }
            },
            transient,
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_fixed(
            RetryPolicy::new(5, Duration::from_secs(1)),
            "test",
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Fatal) }
            },
            transient,
        )
        .await;

        assert!(matches!(result, Err(RetryError::Fatal(TestError::Fatal))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_attempts() {
        let start = tokio::time::Instant::now();
        let result: Result<(), _> = retry_fixed(
            RetryPolicy::new(2, Duration::from_secs(10)),
            "test",
            |_| async { Err(TestError::Transient) },
            transient,
        )
        .await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
        assert!(start.elapsed() >= Duration::from_secs(20));
    }
}
