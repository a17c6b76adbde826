//! Terminal job results, as delivered to the caller's callback.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Failed,
}

/// Groups of artifacts a job produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactCategory {
    Captions,
    Chapters,
    Translations,
}

impl ArtifactCategory {
    /// Path segment used in artifact keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Captions => "captions",
            Self::Chapters => "chapters",
            Self::Translations => "translations",
        }
    }
}

/// Artifact URLs by category, then by sub-key (`source`, `reconciled`, a language code)
pub type ArtifactUrls = BTreeMap<ArtifactCategory, BTreeMap<String, String>>;

/// Outcome of one job, created once when the pipeline terminates.
///
/// Serializes to the callback payload: `job_id`, `status`, `submitted_at`,
/// `completed_at`, `results`, and `error_message` for failures only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub results: ArtifactUrls,
}

impl JobResult {
    /// A successful result carrying every artifact URL
    pub fn completed(job_id: impl Into<String>, submitted_at: DateTime<Utc>, results: ArtifactUrls) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Completed,
            submitted_at,
            completed_at: Utc::now(),
            error_message: None,
            results,
        }
    }

    /// A failed result; no artifacts are reported
    pub fn failed(
        job_id: impl Into<String>,
        submitted_at: DateTime<Utc>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Failed,
            submitted_at,
            completed_at: Utc::now(),
            error_message: Some(error_message.into()),
            results: ArtifactUrls::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed
    }

    /// Look up one artifact URL
    pub fn url(&self, category: ArtifactCategory, key: &str) -> Option<&str> {
        self.results
            .get(&category)
            .and_then(|urls| urls.get(key))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_payload_shape() {
        let mut results = ArtifactUrls::new();
        results
            .entry(ArtifactCategory::Translations)
            .or_default()
            .insert("fr".to_string(), "https://cdn/x_fr.srt".to_string());

        let result = JobResult::completed("job-1", Utc::now(), results);
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["status"], "completed");
        assert_eq!(value["results"]["translations"]["fr"], "https://cdn/x_fr.srt");
        assert!(value.get("error_message").is_none());
        assert_eq!(result.url(ArtifactCategory::Translations, "fr"), Some("https://cdn/x_fr.srt"));
    }

    #[test]
    fn test_failed_payload_has_error() {
        let result = JobResult::failed("job-2", Utc::now(), "transcription failed");
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["status"], "failed");
        assert_eq!(value["error_message"], "transcription failed");
        assert_eq!(value["results"], serde_json::json!({}));
        assert!(!result.is_completed());
    }
}
