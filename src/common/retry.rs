//! Retry policy shared by the metadata client and the transfer strategies

use crate::error::{MirrorError, Result};
use crate::logging::Logger;
use std::future::Future;
use std::time::Duration;

/// Fixed-backoff retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// A single attempt, no retries
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. The last error is returned on exhaustion.
    pub async fn run<T, F, Fut, P>(
        &self,
        logger: &Logger,
        context: &str,
        is_retryable: P,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&MirrorError) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts && is_retryable(&err) => {
                    logger.warning(&format!(
                        "{} failed (attempt {}/{}): {} - retrying in {}s",
                        context,
                        attempt,
                        max_attempts,
                        err,
                        self.delay.as_secs()
                    ));
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = Cell::new(0);
        let result = policy(3)
            .run(&Logger::new_quiet(), "lookup", MirrorError::is_transient, || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(MirrorError::Network("reset".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = Cell::new(0);
        let result: Result<()> = policy(2)
            .run(&Logger::new_quiet(), "lookup", MirrorError::is_transient, || {
                calls.set(calls.get() + 1);
                async { Err(MirrorError::Timeout("slow".into())) }
            })
            .await;

        assert!(matches!(result, Err(MirrorError::Timeout(_))));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn non_retryable_errors_return_immediately() {
        let calls = Cell::new(0);
        let result: Result<()> = policy(5)
            .run(&Logger::new_quiet(), "lookup", MirrorError::is_transient, || {
                calls.set(calls.get() + 1);
                async { Err(MirrorError::RateLimited("429".into())) }
            })
            .await;

        assert!(result.unwrap_err().is_rate_limited());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
