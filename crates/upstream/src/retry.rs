//! Retry policy for callers that choose to retry a gateway call.
//!
//! Adapters never retry on their own: most sync paths would rather miss a
//! round than block on retries. The few that need a result (the campaign
//! detail fetch during a full sync) wrap the call in [`retry_with_backoff`].

use std::future::Future;
use std::time::Duration;

use crate::error::GatewayError;

/// How often and how patiently a gateway call is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait before the second attempt; doubled for each one after.
    pub base_delay: Duration,
    /// Cap on any single wait, including a server's `Retry-After`.
    pub max_delay: Duration,
    /// Total attempts including the first one.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Whether `err`, seen on attempt number `attempt` (1-based), is worth
    /// another try.
    pub fn should_retry(&self, attempt: u32, err: &GatewayError) -> bool {
        err.is_transient() && attempt < self.max_attempts.max(1)
    }

    /// Wait after failed attempt number `attempt` (1-based). A rate limit's
    /// `Retry-After` wins when it is longer than the backoff.
    pub fn delay_after(&self, attempt: u32, err: &GatewayError) -> Duration {
        let backoff = 2u32
            .checked_pow(attempt.saturating_sub(1))
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(self.max_delay);
        let wait = match err {
            GatewayError::RateLimited {
                retry_after: Some(after),
            } => backoff.max(*after),
            _ => backoff,
        };
        wait.min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails permanently, or `policy` gives up.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if !policy.should_retry(attempt, &err) {
            return Err(err);
        }

        let wait = policy.delay_after(attempt, &err);
        tracing::warn!(
            operation,
            attempt,
            delay_ms = wait.as_millis() as u64,
            error = %err,
            "Transient upstream failure, retrying",
        );
        tokio::time::sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use assert_matches::assert_matches;

    #[test]
    fn delays_double_up_to_cap() {
        let policy = RetryPolicy::default();
        let err = GatewayError::Network("reset".into());
        let delays: Vec<u64> = (1..=7).map(|n| policy.delay_after(n, &err).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
        assert_eq!(policy.delay_after(u32::MAX, &err), Duration::from_secs(30));
    }

    #[test]
    fn retry_after_extends_but_never_past_cap() {
        let policy = RetryPolicy::default();
        let limited = |secs| GatewayError::RateLimited {
            retry_after: Some(Duration::from_secs(secs)),
        };
        assert_eq!(policy.delay_after(1, &limited(5)), Duration::from_secs(5));
        assert_eq!(policy.delay_after(3, &limited(1)), Duration::from_secs(4));
        assert_eq!(policy.delay_after(1, &limited(600)), Duration::from_secs(30));
    }

    #[test]
    fn only_transient_errors_within_budget_are_retried() {
        let policy = RetryPolicy::default();
        let transient = GatewayError::ServerError { status: 502, body: String::new() };
        assert!(policy.should_retry(1, &transient));
        assert!(!policy.should_retry(3, &transient));
        assert!(!policy.should_retry(1, &GatewayError::NotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&RetryPolicy::default(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(GatewayError::ServerError { status: 503, body: String::new() })
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&RetryPolicy::default(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GatewayError::NotFound) }
        })
        .await;
        assert_matches!(result, Err(GatewayError::NotFound));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let config = RetryPolicy {
            max_attempts: 4,
            ..Default::default()
        };
        let started = tokio::time::Instant::now();
        let result: Result<(), _> = retry_with_backoff(&config, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GatewayError::Network("timeout".into())) }
        })
        .await;
        assert_matches!(result, Err(GatewayError::Network(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 1s + 2s + 4s of backoff between four attempts.
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn honours_retry_after() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let result = retry_with_backoff(&RetryPolicy::default(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(GatewayError::RateLimited {
                        retry_after: Some(Duration::from_secs(5)),
                    })
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }
}
