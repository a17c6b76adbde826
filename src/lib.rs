//! mediaq - Durable media job queue and worker pipeline
//!
//! Jobs (a media source, target languages and a callback URL) are validated
//! at submission, queued durably, and processed one at a time by a worker
//! that produces captions, reconciled chapters and translated captions.
//!
//! # Architecture
//!
//! - Jobs travel through a file-backed broker with a dead-letter queue
//! - Delivery is at-least-once; every side effect is keyed by job id
//! - Each stage transition is appended to a JSONL journal
//! - The caller learns the outcome through an HTTP callback
//!
//! # Modules
//!
//! - `adapters`: External services (AssemblyAI, OpenAI, artifact storage)
//! - `core`: Broker, JobQueue, Pipeline, Worker, Journal, Notifier
//! - `domain`: Data structures (Job, Chapter, CaptionEntry, JobResult)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Submit a job
//! mediaq submit --source talk.mp4 --lang fr,es --callback-url https://example.com/hook
//!
//! # Run a worker
//! mediaq work
//!
//! # Check job status
//! mediaq status <job-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use crate::config::Config;
pub use crate::core::{JobQueue, Pipeline, Worker};
pub use domain::{Job, JobRequest, JobResult, JobStatus, Language};
