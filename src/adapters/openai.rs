//! OpenAI-compatible chat completions adapter.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{LanguageModel, Task};
use crate::core::{with_backoff, RetryPolicy, StageError};

const COLLABORATOR: &str = "openai";

/// Configuration for the language model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Overridden by `OPENAI_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Overridden by `OPENAI_MODEL`
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature for chapter suggestions
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Sampling temperature for caption translation
    #[serde(default)]
    pub translation_temperature: f32,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Retries for transport errors and 5xx responses
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_timeout() -> u64 {
    60
}

impl LlmConfig {
    pub fn temperature_for(&self, task: Task) -> f32 {
        match task {
            Task::Chapters => self.temperature,
            Task::Translation => self.translation_temperature,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            translation_temperature: 0.0,
            timeout_secs: default_timeout(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Chat completions client
pub struct OpenAiClient {
    api_key: String,
    config: LlmConfig,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self, StageError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| StageError::collaborator(COLLABORATOR, "API key is not configured"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StageError::Fatal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            config,
            client,
        })
    }

    async fn request(&self, body: &ChatCompletionRequest<'_>) -> Result<String, StageError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| StageError::from_http(COLLABORATOR, "chat completion", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StageError::from_status(
                COLLABORATOR,
                "chat completion",
                status,
                &text,
            ));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| StageError::from_http(COLLABORATOR, "chat completion", e))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| StageError::malformed(COLLABORATOR, "response has no message content"))
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    fn name(&self) -> &str {
        COLLABORATOR
    }

    async fn complete(&self, task: Task, system: &str, prompt: &str) -> Result<String, StageError> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.config.temperature_for(task),
        };
        let body = &body;

        let reply = with_backoff(&self.config.retry, "chat completion", |_| async move {
            self.request(body).await
        })
        .await?;

        debug!(model = %self.config.model, chars = reply.len(), "Completion received");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let body = ChatCompletionRequest {
            model: "gpt-4",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "You are a translation assistant.",
                },
                ChatMessage {
                    role: "user",
                    content: "hi",
                },
            ],
            temperature: 0.3,
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "gpt-4");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_translation_runs_cold() {
        let config = LlmConfig::default();
        assert_eq!(config.temperature_for(Task::Translation), 0.0);
        assert_eq!(config.temperature_for(Task::Chapters), 0.3);

        let config: LlmConfig = serde_yaml::from_str("translation_temperature: 0.2").unwrap();
        assert_eq!(config.temperature_for(Task::Translation), 0.2);
        assert_eq!(config.temperature, 0.3);
    }

    #[test]
    fn test_missing_api_key() {
        let config = LlmConfig {
            api_key: Some(String::new()),
            ..Default::default()
        };
        assert!(OpenAiClient::new(config).is_err());
    }
}
