//! Delivery of terminal job results to the caller's callback URL.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::error::StageError;
use super::retry::{with_backoff, RetryPolicy};
use crate::domain::JobResult;

/// Callback delivery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// Attempts and backoff (3 attempts, 2^attempt seconds)
    #[serde(default = "RetryPolicy::callback")]
    pub retry: RetryPolicy,

    /// Per-attempt request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::callback(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Something that can tell the caller how a job ended
#[async_trait]
pub trait Notify: Send + Sync {
    /// Deliver `result` to `callback_url`; `false` once every attempt failed
    async fn notify(&self, callback_url: &str, result: &JobResult) -> bool;
}

/// POSTs the [`JobResult`] JSON, retrying non-2xx responses and transport errors
pub struct CallbackNotifier {
    client: reqwest::Client,
    config: CallbackConfig,
}

impl CallbackNotifier {
    pub fn new(config: CallbackConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn post(&self, callback_url: &str, result: &JobResult) -> Result<(), StageError> {
        let response = self
            .client
            .post(callback_url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(result)
            .send()
            .await
            .map_err(|e| StageError::transport("callback", e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(StageError::transport(
                "callback",
                format!("HTTP {}", status),
            ))
        }
    }
}

#[async_trait]
impl Notify for CallbackNotifier {
    #[instrument(skip(self, result), fields(job_id = %result.job_id, status = ?result.status))]
    async fn notify(&self, callback_url: &str, result: &JobResult) -> bool {
        let delivered = with_backoff(&self.config.retry, "callback", |attempt| async move {
            let outcome = self.post(callback_url, result).await;
            if outcome.is_ok() {
                info!(attempt, "Callback delivered");
            }
            outcome
        })
        .await;

        match delivered {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    attempts = self.config.retry.max_attempts,
                    error = %e,
                    "Callback delivery failed, giving up"
                );
                false
            }
        }
    }
}
