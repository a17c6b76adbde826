//! Command-line interface for mediaq.
//!
//! Provides commands for submitting jobs, running a worker, checking job
//! status, and inspecting or replaying dead-lettered messages.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::adapters::{AssemblyAiTranscriber, OpenAiClient};
use crate::config::Config;
use crate::core::{
    CallbackNotifier, Collaborators, FileBroker, JobQueue, Journal, Outcome, Pipeline, Worker,
};
use crate::domain::{ArtifactCategory, JobRecord, JobRequest, JobStatus};

/// mediaq - Durable media job queue and worker pipeline
#[derive(Parser, Debug)]
#[command(name = "mediaq")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a job and put it on the queue
    Submit {
        /// Local path or http(s) URL of the media
        #[arg(short, long)]
        source: String,

        /// Target language (en, fr, es, ar); repeat or comma-separate
        #[arg(short, long = "lang", value_delimiter = ',')]
        languages: Vec<String>,

        /// URL that receives the terminal status
        #[arg(short, long)]
        callback_url: String,

        /// Use this job id instead of minting one
        #[arg(long)]
        job_id: Option<String>,
    },

    /// Consume jobs from the queue
    Work {
        /// Process at most one ready job, then exit
        #[arg(long)]
        once: bool,
    },

    /// Show a job's journaled state, or recent jobs and queue depth
    Status {
        /// Job id
        job_id: Option<String>,

        /// Maximum number of jobs to list
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// List messages on the dead-letter queue
    DeadLetters,

    /// Move a dead-lettered message back onto the job queue
    Replay {
        /// Message id (UUID) as shown by `dead-letters`
        message_id: String,
    },

    /// Show resolved configuration (secrets masked)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = Config::load()?;

        match self.command {
            Commands::Submit {
                source,
                languages,
                callback_url,
                job_id,
            } => {
                let request = JobRequest {
                    job_id,
                    source,
                    languages,
                    callback_url,
                };
                submit(&config, request).await
            }
            Commands::Work { once } => work(&config, once).await,
            Commands::Status { job_id, limit } => match job_id {
                Some(job_id) => show_status(&config, &job_id).await,
                None => list_jobs(&config, limit).await,
            },
            Commands::DeadLetters => list_dead_letters(&config).await,
            Commands::Replay { message_id } => replay(&config, &message_id).await,
            Commands::Config => show_config(&config),
        }
    }
}

fn open_queue(config: &Config) -> Result<JobQueue> {
    let broker = FileBroker::open(config.broker_dir())
        .with_context(|| format!("Failed to open broker at {}", config.broker_dir().display()))?;
    Ok(JobQueue::new(Arc::new(broker), config.queue.clone()))
}

async fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let transcriber = AssemblyAiTranscriber::new(config.transcription.clone())
        .context("Transcription is not configured")?;
    let llm = OpenAiClient::new(config.llm.clone()).context("Language model is not configured")?;
    let store = config
        .artifacts
        .build(&config.artifacts_dir())
        .context("Artifact store is not configured")?;
    let journal = Journal::open(config.journal_path()).await?;

    let collaborators = Collaborators {
        transcriber: Arc::new(transcriber),
        llm: Arc::new(llm),
        store,
        notifier: Arc::new(CallbackNotifier::new(config.callback.clone())),
    };

    Ok(Pipeline::new(collaborators, journal, config.translation.policy))
}

/// Ingestion boundary: validate, then enqueue
async fn submit(config: &Config, request: JobRequest) -> Result<()> {
    let job = request.validate().context("Job rejected")?;
    let queue = open_queue(config)?;

    let message_id = queue
        .enqueue(&job)
        .await
        .with_context(|| format!("Failed to enqueue job {}", job.job_id))?;

    let languages: Vec<&str> = job.target_languages.iter().map(|l| l.code()).collect();
    println!("📥 Queued job {}", job.job_id);
    println!("   Message:   {}", message_id);
    println!("   Source:    {}", job.source);
    println!("   Languages: {}", languages.join(", "));
    Ok(())
}

async fn work(config: &Config, once: bool) -> Result<()> {
    let queue = open_queue(config)?;
    queue.declare().await?;

    let status = queue.status().await?;
    println!(
        "🔧 Worker on '{}' ({} ready, {} dead-lettered)",
        config.queue.name, status.ready, status.dead_lettered
    );

    let pipeline = build_pipeline(config).await?;
    let mut worker = Worker::new(&queue, pipeline);

    if once {
        match worker.run_once().await? {
            Some(outcome) => print_outcome(&outcome),
            None => println!("Queue is empty"),
        }
        return Ok(());
    }

    // Set up Ctrl+C handler
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        let _ = stop_tx.send(());
    });

    let stats = worker
        .run(async {
            let _ = stop_rx.await;
            println!();
            println!("🛑 Stopping after the current job...");
        })
        .await?;

    println!(
        "Processed {} job(s): {} completed, {} dead-lettered, {} callback(s) undelivered",
        stats.processed, stats.completed, stats.dead_lettered, stats.callbacks_failed
    );
    Ok(())
}

fn print_outcome(outcome: &Outcome) {
    let result = &outcome.result;
    match result.status {
        JobStatus::Completed => println!("✅ Job {} completed", result.job_id),
        JobStatus::Failed => println!(
            "❌ Job {} failed: {}",
            result.job_id,
            result.error_message.as_deref().unwrap_or("unknown error")
        ),
    }
    for (category, urls) in &result.results {
        for (key, url) in urls {
            println!("   {}.{}: {}", category.as_str(), key, url);
        }
    }
    if !outcome.delivered {
        println!("   ⚠️  Callback was not delivered");
    }
}

/// Show the journaled state of one job
async fn show_status(config: &Config, job_id: &str) -> Result<()> {
    let journal = Journal::open(config.journal_path()).await?;
    let record = journal
        .record(job_id)
        .await?
        .with_context(|| format!("No journal entries for job {}", job_id))?;

    println!("Job ID: {}", record.job_id);
    println!("State: {}", state_label(&record));
    println!("Stage: {}", record.stage);
    println!("Received: {}", record.received_at);
    if let Some(finished) = record.finished_at {
        println!("Finished: {}", finished);
    }
    if record.deliveries > 1 {
        println!("Deliveries: {}", record.deliveries);
    }
    if let Some(error) = &record.error {
        println!("Error: {}", error);
    }
    if let Some(delivered) = record.callback_delivered {
        println!("Callback: {}", if delivered { "delivered" } else { "failed" });
    }

    if let Some(result) = &record.result {
        let categories = [
            ArtifactCategory::Captions,
            ArtifactCategory::Chapters,
            ArtifactCategory::Translations,
        ];
        let has_artifacts = categories.iter().any(|c| result.results.contains_key(c));
        if has_artifacts {
            println!("\nArtifacts:");
            for category in categories {
                for (key, url) in result.results.get(&category).into_iter().flatten() {
                    println!("  {}.{}: {}", category.as_str(), key, url);
                }
            }
        }
    }

    Ok(())
}

/// List recently received jobs and the queue depth
async fn list_jobs(config: &Config, limit: usize) -> Result<()> {
    let queue = open_queue(config)?;
    let status = queue.status().await?;
    println!(
        "Queue '{}': {} ready, {} in flight, {} dead-lettered",
        config.queue.name, status.ready, status.in_flight, status.dead_lettered
    );

    let journal = Journal::open(config.journal_path()).await?;
    let records = journal.records().await?;
    if records.is_empty() {
        println!("\nNo jobs processed yet");
        return Ok(());
    }

    println!();
    println!("{:<38} {:<12} {:<14} {:<25}", "JOB ID", "STATE", "STAGE", "RECEIVED");
    println!("{}", "-".repeat(90));
    for record in records.iter().take(limit) {
        println!(
            "{:<38} {:<12} {:<14} {:<25}",
            record.job_id,
            state_label(record),
            record.stage.as_str(),
            record.received_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    Ok(())
}

fn state_label(record: &JobRecord) -> &'static str {
    match record.status {
        Some(JobStatus::Completed) => "completed",
        Some(JobStatus::Failed) => "failed",
        None => "running",
    }
}

async fn list_dead_letters(config: &Config) -> Result<()> {
    let queue = open_queue(config)?;
    let messages = queue.dead_letters().await?;

    if messages.is_empty() {
        println!("No dead-lettered messages");
        return Ok(());
    }

    println!("{:<38} {:<25} {:<6} {}", "MESSAGE ID", "DEAD-LETTERED", "COUNT", "JOB");
    println!("{}", "-".repeat(100));
    for message in messages {
        let job_id = serde_json::from_str::<serde_json::Value>(&message.body)
            .ok()
            .and_then(|body| body.get("job_id").and_then(|id| id.as_str()).map(String::from))
            .unwrap_or_else(|| "<undecodable>".to_string());
        let (when, count) = match &message.death {
            Some(death) => (
                death.time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                death.count,
            ),
            None => ("-".to_string(), 0),
        };
        println!("{:<38} {:<25} {:<6} {}", message.message_id, when, count, job_id);
        if let Some(death) = &message.death {
            println!("    reason: {}", death.reason);
        }
    }

    Ok(())
}

async fn replay(config: &Config, message_id: &str) -> Result<()> {
    let message_id = Uuid::parse_str(message_id)
        .with_context(|| format!("Invalid message ID: {}", message_id))?;

    let queue = open_queue(config)?;
    let new_id = queue.replay_dead_letter(message_id).await?;

    println!("♻️  Replayed {} as {}", message_id, new_id);
    Ok(())
}

/// Show resolved configuration
fn show_config(config: &Config) -> Result<()> {
    match &config.config_file {
        Some(path) => println!("# Config file: {}", path.display()),
        None => println!("# Config file: (none, using defaults)"),
    }
    let yaml = serde_yaml::to_string(&config.redacted()).context("Failed to render configuration")?;
    print!("{}", yaml);
    Ok(())
}
