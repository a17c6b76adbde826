//! Append-only job journal with file-based persistence.
//!
//! Events from every job go to one newline-delimited JSON file, so the
//! history survives redelivery to a different worker process sharing the
//! same home directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use crate::domain::{JobEvent, JobRecord};

/// File-based job journal using JSONL format
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    /// Open (creating the parent directory) a journal at `path`
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create journal directory: {}", parent.display()))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an event to the log
    pub async fn append(&self, event: &JobEvent) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open journal: {}", self.path.display()))?;

        let json = serde_json::to_string(event).context("Failed to serialize job event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write job event")?;
        file.flush().await.context("Failed to flush job event")?;

        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<JobEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .await
            .with_context(|| format!("Failed to open journal: {}", self.path.display()))?;

        let mut lines = BufReader::new(file).lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JobEvent>(&line) {
                Ok(event) => events.push(event),
                Err(e) => warn!(error = %e, "Skipping unreadable journal line"),
            }
        }

        Ok(events)
    }

    /// Events for one job, in order
    pub async fn events_for(&self, job_id: &str) -> Result<Vec<JobEvent>> {
        let events = self.replay().await?;
        Ok(events.into_iter().filter(|e| e.job_id == job_id).collect())
    }

    /// Latest known state of one job
    pub async fn record(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let events = self.events_for(job_id).await?;
        Ok(JobRecord::from_events(&events))
    }

    /// Latest known state of every job, most recently received first
    pub async fn records(&self) -> Result<Vec<JobRecord>> {
        let mut by_job: BTreeMap<String, Vec<JobEvent>> = BTreeMap::new();
        for event in self.replay().await? {
            by_job.entry(event.job_id.clone()).or_default().push(event);
        }

        let mut records: Vec<JobRecord> = by_job
            .values()
            .filter_map(|events| JobRecord::from_events(events))
            .collect();
        records.sort_by(|a, b| b.received_at.cmp(&a.received_at));

        Ok(records)
    }
}
