//! Jobs and their validation at the ingestion boundary.
//!
//! A [`Job`] is immutable once enqueued. It is only ever constructed from a
//! [`JobRequest`] through [`JobRequest::validate`], or decoded from a queue
//! message and re-validated, so downstream code can rely on its invariants.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Reasons a submission is rejected before it reaches the queue
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Job id cannot be empty")]
    EmptyJobId,

    #[error("Invalid job id '{0}': use letters, digits, '.', '_' or '-' and no '..'")]
    InvalidJobId(String),

    #[error("Media source cannot be empty")]
    EmptySource,

    #[error("Unsupported language code: {0}")]
    UnsupportedLanguage(String),

    #[error("Invalid callback URL '{url}': {reason}")]
    InvalidCallbackUrl { url: String, reason: String },

    #[error("Malformed job payload: {0}")]
    MalformedPayload(String),
}

/// Languages the translation stage knows how to target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Fr,
    Es,
    Ar,
}

impl Language {
    /// Every supported language, in display order
    pub const ALL: [Language; 4] = [Language::En, Language::Fr, Language::Es, Language::Ar];

    /// ISO 639-1 code
    pub fn code(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Fr => "fr",
            Self::Es => "es",
            Self::Ar => "ar",
        }
    }

    /// English name, used in translation prompts
    pub fn name(&self) -> &'static str {
        match self {
            Self::En => "English",
            Self::Fr => "French",
            Self::Es => "Spanish",
            Self::Ar => "Arabic",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_lowercase();
        Language::ALL
            .into_iter()
            .find(|lang| lang.code() == code)
            .ok_or_else(|| ValidationError::UnsupportedLanguage(s.to_string()))
    }
}

/// A submission as received by the ingestion boundary, not yet trusted
#[derive(Debug, Clone, Default)]
pub struct JobRequest {
    /// Caller-supplied id; a UUID v4 is minted when absent
    pub job_id: Option<String>,
    /// Local path or remote URL of the media
    pub source: String,
    /// Requested target language codes (raw)
    pub languages: Vec<String>,
    /// Where the terminal status is POSTed
    pub callback_url: String,
}

impl JobRequest {
    /// Validate the request and produce an immutable [`Job`]
    pub fn validate(self) -> Result<Job, ValidationError> {
        let job_id = match self.job_id {
            Some(id) if id.trim().is_empty() => return Err(ValidationError::EmptyJobId),
            Some(id) => id.trim().to_string(),
            None => Uuid::new_v4().to_string(),
        };

        Job::build(
            job_id,
            self.source,
            &self.languages,
            self.callback_url,
            Utc::now(),
        )
    }
}

/// A unit of work: one media source, processed into captions, chapters,
/// and one translated caption document per target language.
///
/// The wire form is the flat mapping the queue carries:
/// `job_id, file_path, preferred_languages, callback_url, submission_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub job_id: String,

    #[serde(rename = "file_path")]
    pub source: String,

    #[serde(rename = "preferred_languages")]
    pub target_languages: Vec<Language>,

    pub callback_url: String,

    #[serde(rename = "submission_time")]
    pub submitted_at: DateTime<Utc>,
}

/// Raw queue payload, decoded before validation
#[derive(Debug, Deserialize)]
struct JobPayload {
    job_id: String,
    file_path: String,
    #[serde(default)]
    preferred_languages: Vec<String>,
    callback_url: String,
    submission_time: Option<DateTime<Utc>>,
}

impl Job {
    fn build(
        job_id: String,
        source: String,
        languages: &[String],
        callback_url: String,
        submitted_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        validate_job_id(&job_id)?;

        let source = source.trim().to_string();
        if source.is_empty() {
            return Err(ValidationError::EmptySource);
        }

        let target_languages = parse_languages(languages)?;
        validate_callback_url(&callback_url)?;

        Ok(Self {
            job_id,
            source,
            target_languages,
            callback_url,
            submitted_at,
        })
    }

    /// Decode and re-validate a job from its serialized queue form
    pub fn from_payload(body: &[u8]) -> Result<Self, ValidationError> {
        let payload: JobPayload = serde_json::from_slice(body)
            .map_err(|e| ValidationError::MalformedPayload(e.to_string()))?;

        Self::build(
            payload.job_id,
            payload.file_path,
            &payload.preferred_languages,
            payload.callback_url,
            payload.submission_time.unwrap_or_else(Utc::now),
        )
    }

    /// Serialize to the queue wire form
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Whether the source has to be downloaded before transcription
    pub fn is_remote(&self) -> bool {
        self.source.starts_with("http://") || self.source.starts_with("https://")
    }
}

/// Parse, check, and deduplicate language codes, preserving first occurrence.
/// An empty list defaults to English.
fn parse_languages(raw: &[String]) -> Result<Vec<Language>, ValidationError> {
    let mut languages = Vec::with_capacity(raw.len());

    for code in raw {
        // Form fields sometimes arrive as "en,fr"
        for part in code.split(',').filter(|p| !p.trim().is_empty()) {
            let lang: Language = part.parse()?;
            if !languages.contains(&lang) {
                languages.push(lang);
            }
        }
    }

    if languages.is_empty() {
        languages.push(Language::En);
    }

    Ok(languages)
}

/// Job ids become artifact key and URL path segments
fn validate_job_id(job_id: &str) -> Result<(), ValidationError> {
    if job_id.is_empty() {
        return Err(ValidationError::EmptyJobId);
    }

    let safe = job_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !safe || job_id.contains("..") || job_id == "." {
        return Err(ValidationError::InvalidJobId(job_id.to_string()));
    }

    Ok(())
}

fn validate_callback_url(raw: &str) -> Result<(), ValidationError> {
    let url = Url::parse(raw).map_err(|e| ValidationError::InvalidCallbackUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ValidationError::InvalidCallbackUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(languages: &[&str]) -> JobRequest {
        JobRequest {
            job_id: None,
            source: "/media/talk.mp4".to_string(),
            languages: languages.iter().map(|s| s.to_string()).collect(),
            callback_url: "https://example.com/hook".to_string(),
        }
    }

    #[test]
    fn test_validate_mints_job_id() {
        let job = request(&["fr"]).validate().unwrap();
        assert!(Uuid::parse_str(&job.job_id).is_ok());
        assert_eq!(job.target_languages, vec![Language::Fr]);
    }

    #[test]
    fn test_languages_deduplicated_in_order() {
        let job = request(&["es", "fr", "ES", "en,fr"]).validate().unwrap();
        assert_eq!(
            job.target_languages,
            vec![Language::Es, Language::Fr, Language::En]
        );
    }

    #[test]
    fn test_empty_languages_default_to_english() {
        let job = request(&[]).validate().unwrap();
        assert_eq!(job.target_languages, vec![Language::En]);
    }

    #[test]
    fn test_unsupported_language_rejected() {
        let err = request(&["fr", "de"]).validate().unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedLanguage("de".to_string()));
    }

    #[test]
    fn test_callback_url_must_be_http() {
        let mut req = request(&["en"]);
        req.callback_url = "ftp://example.com/hook".to_string();
        assert!(matches!(
            req.validate(),
            Err(ValidationError::InvalidCallbackUrl { .. })
        ));

        let mut req = request(&["en"]);
        req.callback_url = "not a url".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_blank_job_id_rejected() {
        let mut req = request(&["en"]);
        req.job_id = Some("  ".to_string());
        assert_eq!(req.validate().unwrap_err(), ValidationError::EmptyJobId);
    }

    #[test]
    fn test_unsafe_job_ids_rejected() {
        for id in ["..", ".", "a/b", "a\\b", "x?y", "../etc", "a..b", "job 1", "émission"] {
            let mut req = request(&["en"]);
            req.job_id = Some(id.to_string());
            assert_eq!(
                req.validate().unwrap_err(),
                ValidationError::InvalidJobId(id.to_string()),
                "{id}"
            );
        }

        let mut req = request(&["en"]);
        req.job_id = Some("lecture_01.v2-final".to_string());
        assert_eq!(req.validate().unwrap().job_id, "lecture_01.v2-final");

        let err = Job::from_payload(
            br#"{"job_id":"a/b","file_path":"x","callback_url":"https://h/c"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidJobId(_)));
    }

    #[test]
    fn test_payload_uses_wire_keys() {
        let mut req = request(&["fr", "ar"]);
        req.job_id = Some("job-1".to_string());
        let job = req.validate().unwrap();

        let payload = job.to_payload().unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["job_id"], "job-1");
        assert_eq!(value["file_path"], "/media/talk.mp4");
        assert_eq!(value["preferred_languages"], serde_json::json!(["fr", "ar"]));
        assert_eq!(value["callback_url"], "https://example.com/hook");
        assert!(value["submission_time"].is_string());

        let decoded = Job::from_payload(payload.as_bytes()).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn test_malformed_payload_rejected() {
        let err = Job::from_payload(b"{\"job_id\": 3}").unwrap_err();
        assert!(matches!(err, ValidationError::MalformedPayload(_)));

        let err = Job::from_payload(
            br#"{"job_id":"a","file_path":"x","preferred_languages":["xx"],"callback_url":"https://h/c"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedLanguage(_)));
    }

    #[test]
    fn test_is_remote() {
        let mut job = request(&["en"]).validate().unwrap();
        assert!(!job.is_remote());
        job.source = "https://cdn.example.com/a.mp4".to_string();
        assert!(job.is_remote());
    }
}
