//! Bounded exponential backoff.
//!
//! Used wherever a transport error can occur: publishing to the broker,
//! fetching from it, calling collaborators, and delivering callbacks.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::Classify;

/// Retry policy for transport operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first failed attempt, in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    60_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Enqueue policy: 5 attempts, waiting 2^attempt seconds after each failure
    pub fn enqueue() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 2000,
            ..Default::default()
        }
    }

    /// Callback policy: 3 attempts, waiting factor^attempt seconds (1, 2, 4, ...)
    pub fn callback() -> Self {
        Self::default()
    }

    /// Same schedule shape with every delay scaled down, for tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 1,
            max_delay_ms: 50,
            backoff_multiplier: 2.0,
        }
    }

    /// Calculate delay after a specific failed attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms.min(self.max_delay_ms));
        }

        let delay = self.initial_delay_ms as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Every wait the policy would schedule if all attempts fail
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts)
            .map(|attempt| self.delay_for_attempt(attempt))
            .collect()
    }
}

/// Run `op`, retrying retryable failures until the policy is exhausted.
///
/// `op` receives the 1-indexed attempt number. Non-retryable errors are
/// returned immediately; no sleep follows the final attempt.
pub async fn with_backoff<T, E, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T, E>
where
    E: Classify + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.kind().is_retryable() && policy.should_retry(attempt) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::StageError;

    #[test]
    fn test_retry_policy_delays() {
        let policy = RetryPolicy {
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 10000,
            ..Default::default()
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(8000));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(10000)); // Capped
    }

    #[test]
    fn test_enqueue_schedule_is_powers_of_two() {
        let schedule = RetryPolicy::enqueue().schedule();
        let secs: Vec<u64> = schedule.iter().map(|d| d.as_secs()).collect();
        assert_eq!(secs, vec![2, 4, 8, 16]);
    }

    #[test]
    fn test_callback_schedule() {
        let secs: Vec<u64> = RetryPolicy::callback()
            .schedule()
            .iter()
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(secs, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_with_backoff_recovers() {
        let policy = RetryPolicy::immediate(4);
        let mut calls = 0;

        let result: Result<u32, StageError> = with_backoff(&policy, "flaky", |attempt| {
            calls += 1;
            async move {
                if attempt < 3 {
                    Err(StageError::transport("flaky", "connection reset"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_with_backoff_exhausts() {
        let policy = RetryPolicy::immediate(3);
        let mut calls = 0;

        let result: Result<(), StageError> = with_backoff(&policy, "down", |_| {
            calls += 1;
            async { Err(StageError::transport("down", "refused")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_with_backoff_does_not_retry_fatal() {
        let policy = RetryPolicy::immediate(5);
        let mut calls = 0;

        let result: Result<(), StageError> = with_backoff(&policy, "parse", |_| {
            calls += 1;
            async { Err(StageError::malformed("openai", "prose instead of JSON")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
