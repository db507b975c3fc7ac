//! Retry policy shared by every completion method

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded retry with a fixed delay between attempts
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

/// Result of a retried operation together with the attempts it consumed
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T>,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op` until it succeeds, the error is not retryable, or the
    /// attempt budget is spent
    pub async fn run<T, F, Fut, P>(&self, mut op: F, is_retryable: P) -> Attempted<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&Error) -> bool,
    {
        let mut last_err: Option<Error> = None;

        for attempt in 1..=self.max_attempts {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("Succeeded on attempt {}/{}", attempt, self.max_attempts);
                    }
                    return Attempted {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(e) if !is_retryable(&e) => {
                    return Attempted {
                        result: Err(e),
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    warn!("Retrying ({}/{}): {}", attempt, self.max_attempts, e);
                    last_err = Some(e);
                    if attempt < self.max_attempts && !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }

        Attempted {
            result: Err(last_err
                .unwrap_or_else(|| Error::Completion("retry budget exhausted".to_string()))),
            attempts: self.max_attempts,
        }
    }
}

/// Everything except cancellation is worth another attempt
pub fn retry_unless_cancelled(err: &Error) -> bool {
    !matches!(err, Error::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_stops_after_max_attempts() {
        let policy = RetryPolicy::new(4, Duration::ZERO);
        let calls = AtomicU32::new(0);

        let outcome: Attempted<()> = policy
            .run(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(Error::Completion("down".to_string())) }
                },
                retry_unless_cancelled,
            )
            .await;

        assert!(outcome.result.is_err());
        assert_eq!(outcome.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_succeeds_mid_budget() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let outcome = policy
            .run(
                |attempt| async move {
                    if attempt < 3 {
                        Err(Error::Completion("busy".to_string()))
                    } else {
                        Ok(attempt)
                    }
                },
                retry_unless_cancelled,
            )
            .await;

        assert_eq!(outcome.result.unwrap(), 3);
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_short_circuits() {
        let policy = RetryPolicy::new(10, Duration::ZERO);
        let outcome: Attempted<()> = policy
            .run(|_| async { Err(Error::Cancelled) }, retry_unless_cancelled)
            .await;

        assert!(matches!(outcome.result, Err(Error::Cancelled)));
        assert_eq!(outcome.attempts, 1);
    }
}
