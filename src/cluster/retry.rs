//! Bounded retry
//!
//! Retries a unit of work a fixed number of times at a constant interval.
//! Used for the admin connection and for background registration that has
//! to survive the cluster being unreachable at process start.

use crate::error::{Error, Result};
use backoff::ExponentialBackoffBuilder;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Wait between attempts
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Attempts actually made, never less than one
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    fn backoff(&self) -> backoff::ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.interval)
            .with_max_interval(self.interval)
            .with_multiplier(1.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Run `operation` until it succeeds or the attempt budget is spent
///
/// The first success short-circuits; when every attempt fails the last
/// error is returned.
pub async fn retry_with_limit<T, F, Fut>(policy: &RetryPolicy, name: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.attempts();
    let mut attempt = 0u32;

    let result = backoff::future::retry_notify(
        policy.backoff(),
        || {
            attempt += 1;
            let current = attempt;
            let pending = operation();
            async move {
                pending.await.map_err(|err| {
                    if current >= max_attempts {
                        backoff::Error::permanent(err)
                    } else {
                        backoff::Error::transient(err)
                    }
                })
            }
        },
        |err: Error, wait: Duration| {
            warn!("{} failed, retrying in {:?}: {}", name, wait, err);
        },
    )
    .await;

    if result.is_ok() && attempt > 1 {
        debug!("{} succeeded after {} attempts", name, attempt);
    }

    result
}
