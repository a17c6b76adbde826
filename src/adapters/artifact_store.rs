//! Artifact storage backends.
//!
//! Keys look like `{job_id}/{category}/{file}`; both backends overwrite an
//! existing key, so re-publishing a redelivered job is harmless.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use super::ArtifactStore;
use crate::core::{with_backoff, RetryPolicy, StageError};

/// Where artifacts are published
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// HTTP base URL accepting PUTs (`ARTIFACT_BASE_URL`); takes precedence over `dir`
    #[serde(default)]
    pub base_url: Option<String>,

    /// Bearer token for the HTTP store (`ARTIFACT_TOKEN`)
    #[serde(default)]
    pub token: Option<String>,

    /// Local directory (`ARTIFACT_DIR`); defaults to `{home}/artifacts`
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Retries for transport errors on upload
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl ArtifactConfig {
    /// Build the configured store; `default_dir` is used when nothing is set
    pub fn build(&self, default_dir: &Path) -> Result<Arc<dyn ArtifactStore>, StageError> {
        match &self.base_url {
            Some(base_url) => Ok(Arc::new(HttpArtifactStore::new(
                base_url,
                self.token.clone(),
                self.retry.clone(),
            )?)),
            None => {
                let dir = self.dir.clone().unwrap_or_else(|| default_dir.to_path_buf());
                Ok(Arc::new(LocalArtifactStore::new(dir)))
            }
        }
    }
}

/// Reject keys that would escape the store root
fn validate_key(key: &str) -> Result<(), StageError> {
    let path = Path::new(key);
    let safe = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(())
    } else {
        Err(StageError::Fatal(format!("Invalid artifact key: '{}'", key)))
    }
}

/// Copies artifacts into a directory and returns `file://` URLs
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<String, StageError> {
        validate_key(key)?;

        let destination = self.root.join(key);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Copy to a sibling first so readers never see a partial file
        let staging = destination.with_extension("partial");
        fs::copy(local_path, &staging).await?;
        fs::rename(&staging, &destination).await?;

        let absolute = fs::canonicalize(&destination).await?;
        let url = Url::from_file_path(&absolute).map_err(|_| {
            StageError::Fatal(format!("Cannot build file URL for {}", absolute.display()))
        })?;

        debug!(key, url = %url, "Artifact stored");
        Ok(url.to_string())
    }
}

/// PUTs artifacts to `{base_url}/{key}`
pub struct HttpArtifactStore {
    base_url: String,
    token: Option<String>,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl HttpArtifactStore {
    pub fn new(base_url: &str, token: Option<String>, retry: RetryPolicy) -> Result<Self, StageError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| StageError::Fatal(format!("Invalid artifact base URL '{}': {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(StageError::Fatal(format!(
                "Artifact base URL must be http(s): {}",
                base_url
            )));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            retry,
            client: reqwest::Client::new(),
        })
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    fn name(&self) -> &str {
        "http"
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<String, StageError> {
        validate_key(key)?;
        let url = self.url_for(key);
        let url = url.as_str();

        with_backoff(&self.retry, "artifact upload", |_| async move {
            let file = fs::File::open(local_path).await?;
            let mut request = self.client.put(url).body(reqwest::Body::from(file));
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| StageError::from_http("artifact store", "upload", e))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(StageError::from_status("artifact store", "upload", status, &body));
            }
            Ok(())
        })
        .await?;

        debug!(key, url, "Artifact uploaded");
        Ok(url.to_string())
    }
}
