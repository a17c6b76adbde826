//! AssemblyAI speech-to-text adapter.
//!
//! Uploads the media, requests a transcript with `auto_chapters`, then polls
//! until the transcript is `completed` or `error`.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{Transcriber, Transcript};
use crate::core::{with_backoff, RetryPolicy, StageError};
use crate::domain::{Chapter, Word};

const COLLABORATOR: &str = "assemblyai";

/// Configuration for the transcription service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Overridden by `ASSEMBLYAI_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Delay between status polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Give up on a transcript that is still processing after this long
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,

    /// Retries for transport errors on each request
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_base_url() -> String {
    "https://api.assemblyai.com".to_string()
}
fn default_poll_interval() -> u64 {
    3000
}
fn default_max_wait() -> u64 {
    3600
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            poll_interval_ms: default_poll_interval(),
            max_wait_secs: default_max_wait(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Debug, Serialize)]
struct TranscriptRequest<'a> {
    audio_url: &'a str,
    auto_chapters: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TranscriptStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    id: String,
    status: TranscriptStatus,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    words: Option<Vec<ApiWord>>,
    #[serde(default)]
    chapters: Option<Vec<ApiChapter>>,
}

#[derive(Debug, Deserialize)]
struct ApiWord {
    start: u64,
    end: u64,
    text: String,
}

/// Chapter timings arrive in milliseconds
#[derive(Debug, Deserialize)]
struct ApiChapter {
    start: u64,
    end: u64,
    headline: String,
}

impl TranscriptResponse {
    fn into_transcript(self) -> Transcript {
        Transcript {
            text: self.text.unwrap_or_default(),
            words: self
                .words
                .unwrap_or_default()
                .into_iter()
                .map(|w| Word {
                    start: w.start,
                    end: w.end,
                    text: w.text,
                })
                .collect(),
            chapters: self
                .chapters
                .unwrap_or_default()
                .into_iter()
                .map(|c| Chapter::new(c.start as f64 / 1000.0, c.end as f64 / 1000.0, c.headline))
                .collect(),
        }
    }
}

/// AssemblyAI client
pub struct AssemblyAiTranscriber {
    api_key: String,
    config: TranscriptionConfig,
    client: reqwest::Client,
}

impl AssemblyAiTranscriber {
    pub fn new(config: TranscriptionConfig) -> Result<Self, StageError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| StageError::collaborator(COLLABORATOR, "API key is not configured"))?;

        Ok(Self {
            api_key,
            config,
            client: reqwest::Client::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Read a JSON body, classifying non-2xx statuses
    async fn read_json<T: serde::de::DeserializeOwned>(
        operation: &str,
        response: reqwest::Response,
    ) -> Result<T, StageError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::from_status(COLLABORATOR, operation, status, &body));
        }
        response
            .json()
            .await
            .map_err(|e| StageError::from_http(COLLABORATOR, operation, e))
    }

    async fn upload(&self, media: &Path) -> Result<String, StageError> {
        let uploaded: UploadResponse = with_backoff(&self.config.retry, "assemblyai upload", |_| async move {
            let file = tokio::fs::File::open(media).await?;
            let response = self
                .client
                .post(self.url("upload"))
                .header("authorization", &self.api_key)
                .body(reqwest::Body::from(file))
                .send()
                .await
                .map_err(|e| StageError::from_http(COLLABORATOR, "upload", e))?;
            Self::read_json("upload", response).await
        })
        .await?;

        Ok(uploaded.upload_url)
    }

    async fn request_transcript(&self, audio_url: &str) -> Result<TranscriptResponse, StageError> {
        let request = TranscriptRequest {
            audio_url,
            auto_chapters: true,
        };
        let request = &request;

        with_backoff(&self.config.retry, "assemblyai transcript", |_| async move {
            let response = self
                .client
                .post(self.url("transcript"))
                .header("authorization", &self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| StageError::from_http(COLLABORATOR, "transcript", e))?;
            Self::read_json("transcript", response).await
        })
        .await
    }

    async fn poll(&self, id: &str) -> Result<TranscriptResponse, StageError> {
        with_backoff(&self.config.retry, "assemblyai poll", |_| async move {
            let response = self
                .client
                .get(self.url(&format!("transcript/{}", id)))
                .header("authorization", &self.api_key)
                .send()
                .await
                .map_err(|e| StageError::from_http(COLLABORATOR, "poll", e))?;
            Self::read_json("poll", response).await
        })
        .await
    }
}

#[async_trait]
impl Transcriber for AssemblyAiTranscriber {
    fn name(&self) -> &str {
        COLLABORATOR
    }

    #[instrument(skip(self, media), fields(media = %media.display()))]
    async fn transcribe(&self, media: &Path) -> Result<Transcript, StageError> {
        let audio_url = self.upload(media).await?;
        debug!("Media uploaded");

        let mut transcript = self.request_transcript(&audio_url).await?;
        let deadline = Instant::now() + Duration::from_secs(self.config.max_wait_secs);
        let interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            match transcript.status {
                TranscriptStatus::Completed => break,
                TranscriptStatus::Error => {
                    return Err(StageError::collaborator(
                        COLLABORATOR,
                        transcript
                            .error
                            .unwrap_or_else(|| "transcription failed".to_string()),
                    ));
                }
                TranscriptStatus::Queued | TranscriptStatus::Processing => {
                    if Instant::now() >= deadline {
                        return Err(StageError::collaborator(
                            COLLABORATOR,
                            format!(
                                "transcript {} still {:?} after {}s",
                                transcript.id, transcript.status, self.config.max_wait_secs
                            ),
                        ));
                    }
                    tokio::time::sleep(interval).await;
                    transcript = self.poll(&transcript.id).await?;
                }
            }
        }

        let transcript = transcript.into_transcript();
        info!(
            words = transcript.words.len(),
            chapters = transcript.chapters.len(),
            "Transcript completed"
        );
        Ok(transcript)
    }
}
