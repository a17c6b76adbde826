//! Job state reconstructed from journal events.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::events::{EventType, JobEvent, Stage};
use super::result::{JobResult, JobStatus};

/// Latest known state of one job
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub job_id: String,

    /// Stage most recently entered
    pub stage: Stage,

    /// Terminal status, once known
    pub status: Option<JobStatus>,

    /// When the worker first pulled the job
    pub received_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,

    /// Last error recorded
    pub error: Option<String>,

    /// Final result handed to the notifier
    pub result: Option<JobResult>,

    /// Whether the last callback attempt round succeeded
    pub callback_delivered: Option<bool>,

    /// How many times the job was received (more than one under redelivery)
    pub deliveries: u32,
}

impl JobRecord {
    /// Rebuild a job's state from its events; `None` when there are none
    pub fn from_events(events: &[JobEvent]) -> Option<Self> {
        let first = events.first()?;

        let mut record = Self {
            job_id: first.job_id.clone(),
            stage: Stage::Received,
            status: None,
            received_at: first.timestamp,
            finished_at: None,
            error: None,
            result: None,
            callback_delivered: None,
            deliveries: 0,
        };

        let job_id = record.job_id.clone();
        for event in events.iter().filter(|e| e.job_id == job_id) {
            record.apply_event(event);
        }

        Some(record)
    }

    /// Apply a single event
    pub fn apply_event(&mut self, event: &JobEvent) {
        match event.event_type {
            EventType::JobReceived => {
                // A redelivery starts the job over
                self.deliveries += 1;
                self.stage = Stage::Received;
                self.status = None;
                self.finished_at = None;
                self.error = None;
                self.callback_delivered = None;
            }
            EventType::StageStarted | EventType::StageCompleted => {
                self.stage = event.stage;
            }
            EventType::StageFailed => {
                self.stage = event.stage;
                self.error = event.error.clone();
            }
            EventType::JobCompleted => {
                self.stage = Stage::Completed;
                self.status = Some(JobStatus::Completed);
                self.finished_at = Some(event.timestamp);
                self.result = event.result.clone();
            }
            EventType::JobFailed => {
                self.stage = Stage::Failed;
                self.status = Some(JobStatus::Failed);
                self.finished_at = Some(event.timestamp);
                self.result = event.result.clone();
                if event.error.is_some() {
                    self.error = event.error.clone();
                }
            }
            EventType::CallbackDelivered => self.callback_delivered = Some(true),
            EventType::CallbackFailed => self.callback_delivered = Some(false),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_some()
    }
}
