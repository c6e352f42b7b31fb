//! Bounded retry with exponential backoff.
//!
//! The policy is a plain value passed into call sites so it can be tested
//! in isolation from network calls. Only errors classified transient by
//! [`AgentError::is_transient`] are retried.

use std::future::Future;
use std::time::Duration;

use crate::errors::AgentError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration, multiplier: u32) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier,
        }
    }

    /// Default policy for inference and exchange calls: 3 attempts with
    /// 1s, 2s, 4s backoff.
    #[must_use]
    pub const fn standard() -> Self {
        Self::new(3, Duration::from_secs(1), 2)
    }

    /// Delay before the attempt following `completed_attempts` failures.
    #[must_use]
    pub fn delay_after(&self, completed_attempts: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(completed_attempts.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Runs `op` up to `policy.max_attempts` times, sleeping between attempts.
///
/// Non-transient errors and exhaustion both return the last error.
///
/// # Errors
/// Returns the final error once attempts are exhausted or a non-transient
/// error occurs.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    op_name: &str,
    mut op: F,
) -> Result<T, AgentError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AgentError>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    op = op_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "transient failure, retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::debug!(op = op_name, attempt, error = %e, "giving up");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), 2)
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::standard();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = with_retry(fast_policy(3), "test", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AgentError::Network("flaky".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = with_retry(fast_policy(3), "test", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AgentError::Timeout("deadline".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(AgentError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_fails_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = with_retry(fast_policy(5), "test", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AgentError::OrderRejected("below min size".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(AgentError::OrderRejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
