//! Bounded-retry policy shared by all vendor adapters.
//!
//! The original per-driver retry loops all did the same thing with
//! different constants: try, sleep a little, give up after a small fixed
//! bound. [`with_retry`] is that loop, once, parameterized by policy.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Defines a policy for retrying an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum total attempts (including the first). Must be at least 1.
    pub max_attempts: u32,
    /// Constant delay between attempts.
    pub backoff_delay: Duration,
}

impl Default for RetryPolicy {
    /// Three attempts, 100 ms apart — the bound the serial drivers this
    /// stack replaces converged on.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_delay: Duration::from_millis(100),
        }
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// Failures between attempts are logged at `warn`; the final failure is
/// returned unchanged.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempts = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempts += 1;
                if attempts >= policy.max_attempts {
                    return Err(err);
                }
                tracing::warn!(
                    target: "motor::retry",
                    attempt = attempts,
                    max_attempts = policy.max_attempts,
                    "operation '{}' failed: {}. Retrying in {:?}",
                    operation,
                    err,
                    policy.backoff_delay
                );
                sleep(policy.backoff_delay).await;
            }
        }
    }
}
