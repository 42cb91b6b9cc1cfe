//! Fixed-backoff retries for startup connectivity.

use std::{fmt::Display, future::Future, time::Duration};

use thiserror::Error;
use tracing::warn;

/// How many times to try, and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

#[derive(Debug, Error)]
#[error("{what} failed after {attempts} attempts: {last}")]
pub struct RetryError<E> {
    pub what: String,
    pub attempts: u32,
    pub last: E,
}

/// Runs `op` until it succeeds or `policy.max_attempts` is reached, sleeping `policy.delay`
/// between attempts.
pub async fn retry_fixed<T, E, F, Fut>(
    what: &str,
    policy: RetryPolicy,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(err) if attempt >= max_attempts => {
                return Err(RetryError {
                    what: what.to_owned(),
                    attempts: attempt,
                    last: err,
                });
            }
            Err(err) => {
                warn!(%what, %attempt, %max_attempts, %err, "attempt failed, retrying");
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}
