//! Retry with exponential backoff and jitter.
//!
//! The policy is shared by the feed fetcher and the LLM client. Sleeping goes
//! through the [`Sleep`] trait so tests can record delays instead of waiting.
//!
//! ```text
//! delay(attempt) = min(base_delay * 2^(attempt-1), max_delay) + random(0..=max_jitter)
//! ```

use rand::{Rng, rng};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Something that can pause the current task.
pub trait Sleep {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleep`] backed by `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleep;

impl Sleep for TokioSleep {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub max_attempts: usize,
    /// Delay after the first failure; doubles after each further failure.
    pub base_delay: Duration,
    /// Upper bound for the exponential part of the delay.
    pub max_delay: Duration,
    /// Upper bound for the random jitter added on top.
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay: Duration::from_secs(30),
            max_jitter: Duration::from_millis(500),
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Backoff without jitter after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as u32;
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Full delay after the given failed attempt, jitter included.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        self.backoff_for(attempt) + random_jitter(self.max_jitter)
    }
}

/// Uniform random duration in `0..=max`, millisecond resolution.
pub fn random_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng().random_range(0..=max_ms))
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// # Arguments
///
/// * `policy` - Attempt limit and backoff; see [`RetryPolicy::delay_for`]
/// * `sleeper` - Performs the waits between attempts
/// * `label` - Name used in the retry log lines
/// * `op` - Called with the 1-based attempt number
///
/// # Returns
///
/// The first `Ok`, or the error of the last attempt when every attempt fails.
///
/// # Examples
///
/// ```ignore
/// let policy = RetryPolicy::new(3, Duration::from_secs(1));
/// let body = retry(&policy, &TokioSleep, "feed fetch", |_| client.get(url).send()).await?;
/// ```
pub async fn retry<T, E, F, Fut, S>(
    policy: &RetryPolicy,
    sleeper: &S,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
    S: Sleep,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0usize;

    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt >= max_attempts {
                    error!(label, attempt, max = max_attempts, error = %e, "Retries exhausted");
                    return Err(e);
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    label,
                    attempt,
                    max = max_attempts,
                    ?delay,
                    error = %e,
                    "Attempt failed; backing off"
                );
                sleeper.sleep(delay).await;
            }
        }
    }
}
