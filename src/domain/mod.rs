//! Domain types for the media job pipeline.
//!
//! This module contains the core data structures:
//! - Job: A validated, immutable unit of work
//! - Chapter / CaptionEntry: The media artifacts a job produces
//! - JobResult: The terminal outcome handed to the callback
//! - JobEvent / JobRecord: Journal entries and replayed job state

pub mod caption;
pub mod chapter;
pub mod events;
pub mod job;
pub mod record;
pub mod result;

// Re-export commonly used types
pub use caption::{CaptionEntry, CaptionError, Word};
pub use chapter::Chapter;
pub use events::{EventType, JobEvent, Stage};
pub use job::{Job, JobRequest, Language, ValidationError};
pub use record::JobRecord;
pub use result::{ArtifactCategory, ArtifactUrls, JobResult, JobStatus};
