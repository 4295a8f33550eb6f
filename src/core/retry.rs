//! Retry helper for transient queue-service failures

use std::time::Duration;
use tokio::time::sleep;

/// How many times to try an operation and how long to wait in between
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }
}

/// Run `operation` until it succeeds or the policy's attempts are used up
///
/// A policy with zero attempts still runs the operation once. The error of
/// the final attempt is returned.
///
/// # Examples
/// ```rust
/// use qrelay::core::retry::{retry_async, RetryPolicy};
///
/// # async fn example() -> Result<String, String> {
/// let url = retry_async("create response queue", RetryPolicy::attempts(3), || async {
///     Ok::<String, String>("memory://queues/APP_RQ_TEMP".to_string())
/// })
/// .await?;
/// # Ok(url)
/// # }
/// ```
pub async fn retry_async<F, T, E, Fut>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) if attempt < attempts => {
                log::debug!(
                    "Operation '{}' failed on attempt {}/{}, retrying in {:?}: {}",
                    operation_name,
                    attempt,
                    attempts,
                    policy.delay,
                    error
                );
                attempt += 1;
                sleep(policy.delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}
