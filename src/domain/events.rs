//! Journal events recorded while a job moves through the pipeline.
//!
//! Events are append-only. The latest known state of a job is rebuilt by
//! replaying its events in order (see [`super::record::JobRecord`]).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::JobResult;

/// A single entry in the job journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred
    pub timestamp: DateTime<Utc>,

    /// The job this event belongs to
    pub job_id: String,

    /// Type of event
    pub event_type: EventType,

    /// Pipeline stage the event refers to
    pub stage: Stage,

    /// Human-readable summary (NO secrets)
    pub summary: String,

    /// Time taken in milliseconds (for completed stages)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Error message if failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Final result, attached to terminal events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
}

impl JobEvent {
    /// Create a new event with the current timestamp
    pub fn new(
        job_id: impl Into<String>,
        event_type: EventType,
        stage: Stage,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            job_id: job_id.into(),
            event_type,
            stage,
            summary: summary.into(),
            duration_ms: None,
            error: None,
            result: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_result(mut self, result: JobResult) -> Self {
        self.result = Some(result);
        self
    }
}

/// Types of journal events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Worker pulled the job from the queue
    JobReceived,

    StageStarted,

    StageCompleted,

    /// A stage failed; the job is aborted
    StageFailed,

    /// Job reached `Completed`
    JobCompleted,

    /// Job reached `Failed`
    JobFailed,

    CallbackDelivered,

    /// Callback retries exhausted (the job outcome stands)
    CallbackFailed,
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Transcribing,
    Chaptering,
    Translating,
    Publishing,
    Notifying,
    Completed,
    Failed,
}

impl Stage {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Transcribing => "transcribing",
            Self::Chaptering => "chaptering",
            Self::Translating => "translating",
            Self::Publishing => "publishing",
            Self::Notifying => "notifying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
