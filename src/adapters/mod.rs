//! Adapter interfaces for external systems.
//!
//! The pipeline only talks to the speech-to-text service, the language
//! model, and artifact storage through these traits, so tests can swap in
//! fakes and deployments can swap providers.

pub mod artifact_store;
pub mod assemblyai;
pub mod media;
pub mod openai;
pub mod prompts;

use std::path::Path;

use async_trait::async_trait;

use crate::core::StageError;
use crate::domain::{Chapter, Word};

pub use artifact_store::{ArtifactConfig, HttpArtifactStore, LocalArtifactStore};
pub use assemblyai::{AssemblyAiTranscriber, TranscriptionConfig};
pub use openai::{LlmConfig, OpenAiClient};
pub use prompts::{suggest_chapters, translate_captions};

/// Output of the speech-to-text collaborator
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    /// Full plain text
    pub text: String,

    /// Word-level timings, in milliseconds
    pub words: Vec<Word>,

    /// Structural chapters, in seconds (may be empty)
    pub chapters: Vec<Chapter>,
}

/// Speech-to-text service
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Human-readable collaborator name
    fn name(&self) -> &str;

    /// Transcribe a local media file
    async fn transcribe(&self, media: &Path) -> Result<Transcript, StageError>;
}

/// What a completion is for; models may tune sampling per task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Chapters,
    Translation,
}

/// Chat-style language model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    /// Run one completion and return the reply text
    async fn complete(&self, task: Task, system: &str, prompt: &str) -> Result<String, StageError>;
}

/// Storage that hosts produced artifacts.
///
/// Uploading the same key twice overwrites, so redelivered jobs do not
/// produce duplicates.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    fn name(&self) -> &str;

    /// Upload a local file under `key`; returns its addressable URL
    async fn upload(&self, local_path: &Path, key: &str) -> Result<String, StageError>;
}
