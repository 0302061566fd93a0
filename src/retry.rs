//! Retryable-call abstraction shared by every external call site.
//!
//! A call is retried only when the supplied predicate says the failure is
//! retryable (in practice: rate limiting). The backoff schedule is linear,
//! `base_delay * attempt`, with a capped attempt count.

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following the given (1-based) attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt.max(1)
    }
}

/// Run `op`, retrying while `is_retryable` approves the error and attempts
/// remain. Non-retryable errors propagate immediately.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    is_retryable: P,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= attempts || !is_retryable(&err) {
                    return Err(err);
                }
                let delay = policy.delay_after(attempt);
                log::warn!(
                    "retry {}/{} in {:?} after error: {}",
                    attempt,
                    attempts,
                    delay,
                    err
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
