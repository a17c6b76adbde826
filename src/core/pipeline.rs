//! Per-job stage sequence: transcribe, chapter, translate, publish, notify.
//!
//! Every stage transition is logged and journaled. Any stage failure stops
//! the job and produces a failed [`JobResult`], which is still reported to
//! the callback before the worker dead-letters the message.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::fs;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn, Instrument};

use super::error::{Classify, StageError};
use super::journal::Journal;
use super::notifier::Notify;
use super::reconcile::reconcile;
use crate::adapters::{
    media, suggest_chapters, translate_captions, ArtifactStore, LanguageModel, Transcriber,
    Transcript,
};
use crate::domain::caption::{build_captions, parse_srt, write_srt};
use crate::domain::{
    ArtifactCategory, ArtifactUrls, CaptionEntry, EventType, Job, JobEvent, JobResult, Language,
    Stage,
};

/// What happens when some, but not all, languages fail to translate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationPolicy {
    /// Any failed language fails the job
    #[default]
    AllOrNothing,

    /// Failed languages are left out of the result; the job still fails if
    /// every language failed
    BestEffort,
}

/// Translation stage settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslationConfig {
    #[serde(default)]
    pub policy: TranslationPolicy,
}

/// External services a pipeline drives
#[derive(Clone)]
pub struct Collaborators {
    pub transcriber: Arc<dyn Transcriber>,
    pub llm: Arc<dyn LanguageModel>,
    pub store: Arc<dyn ArtifactStore>,
    pub notifier: Arc<dyn Notify>,
}

/// Result of processing one job
#[derive(Debug)]
pub struct Outcome {
    /// The terminal result handed to the notifier
    pub result: JobResult,

    /// Whether the callback was delivered
    pub delivered: bool,

    /// The failure that ended the job, if any
    pub error: Option<StageError>,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug)]
struct StageFailure {
    stage: Stage,
    error: StageError,
}

/// Output of the transcribing stage
struct Captioned {
    transcript: Transcript,
    path: PathBuf,
    entries: Vec<CaptionEntry>,
}

/// Artifact key layout: `{job_id}/{category}/{file}`
pub fn artifact_key(job_id: &str, category: ArtifactCategory, sub_key: &str) -> String {
    let file = match category {
        ArtifactCategory::Captions => format!("{}.srt", job_id),
        ArtifactCategory::Chapters => format!("{}_{}.json", job_id, sub_key),
        ArtifactCategory::Translations => format!("{}_{}.srt", job_id, sub_key),
    };
    format!("{}/{}/{}", job_id, category.as_str(), file)
}

/// Runs jobs through the stage sequence
#[derive(Clone)]
pub struct Pipeline {
    collaborators: Collaborators,
    journal: Journal,
    translation: TranslationPolicy,
    scratch_root: Option<PathBuf>,
}

impl Pipeline {
    pub fn new(collaborators: Collaborators, journal: Journal, translation: TranslationPolicy) -> Self {
        Self {
            collaborators,
            journal,
            translation,
            scratch_root: None,
        }
    }

    /// Create per-job scratch directories under `root` instead of the system temp dir
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Run `job` to a terminal state and notify the caller.
    ///
    /// Never fails: errors, including a panic inside a stage, become a
    /// failed [`JobResult`] in the returned [`Outcome`].
    #[instrument(skip(self, job), fields(job_id = %job.job_id))]
    pub async fn process(&self, job: &Job) -> Outcome {
        info!(source = %job.source, languages = ?job.target_languages, "Processing job");
        self.record(JobEvent::new(
            &job.job_id,
            EventType::JobReceived,
            Stage::Received,
            format!("Job received for {}", job.source),
        ))
        .await;

        let started = Instant::now();
        let stages = {
            let pipeline = self.clone();
            let job = job.clone();
            tokio::spawn(async move { pipeline.run_stages(&job).await }.in_current_span())
        };

        let outcome = stages.await.unwrap_or_else(|join_error| {
            Err(StageFailure {
                stage: Stage::Failed,
                error: StageError::Fatal(format!("pipeline task aborted: {}", join_error)),
            })
        });

        let (result, error) = match outcome {
            Ok(results) => (
                JobResult::completed(&job.job_id, job.submitted_at, results),
                None,
            ),
            Err(failure) => {
                error!(stage = %failure.stage, error = %failure.error, "Job failed");
                (
                    JobResult::failed(&job.job_id, job.submitted_at, failure.error.to_string()),
                    Some(failure.error),
                )
            }
        };

        let delivered = self.notify(job, &result).await;

        let duration_ms = started.elapsed().as_millis() as u64;
        let terminal = match &error {
            None => JobEvent::new(
                &job.job_id,
                EventType::JobCompleted,
                Stage::Completed,
                format!("Job completed in {}ms", duration_ms),
            ),
            Some(e) => JobEvent::new(
                &job.job_id,
                EventType::JobFailed,
                Stage::Failed,
                format!("Job failed after {}ms", duration_ms),
            )
            .with_error(e.to_string()),
        };
        self.record(terminal.with_duration(duration_ms).with_result(result.clone()))
            .await;

        info!(status = ?result.status, delivered, duration_ms, "Job finished");

        Outcome {
            result,
            delivered,
            error,
        }
    }

    async fn run_stages(&self, job: &Job) -> Result<ArtifactUrls, StageFailure> {
        // Removed when dropped, whichever way the job ends
        let scratch = self.scratch_dir().map_err(|error| StageFailure {
            stage: Stage::Received,
            error,
        })?;
        let dir = scratch.path();

        let captioned = self
            .stage(job, Stage::Transcribing, self.transcribe(job, dir))
            .await?;

        let chapters_path = self
            .stage(job, Stage::Chaptering, self.chapters(&captioned.transcript, dir))
            .await?;

        let translations = self
            .stage(job, Stage::Translating, self.translate(job, &captioned.entries, dir))
            .await?;

        self.stage(
            job,
            Stage::Publishing,
            self.publish(job, &captioned.path, &chapters_path, &translations),
        )
        .await
    }

    /// Record start/finish of one stage around `work`
    async fn stage<T, F>(&self, job: &Job, stage: Stage, work: F) -> Result<T, StageFailure>
    where
        F: Future<Output = Result<T, StageError>>,
    {
        debug!(%stage, "Stage started");
        self.record(JobEvent::new(
            &job.job_id,
            EventType::StageStarted,
            stage,
            format!("Stage '{}' started", stage),
        ))
        .await;

        let started = Instant::now();
        let result = work.await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                info!(%stage, duration_ms, "Stage completed");
                self.record(
                    JobEvent::new(
                        &job.job_id,
                        EventType::StageCompleted,
                        stage,
                        format!("Stage '{}' completed in {}ms", stage, duration_ms),
                    )
                    .with_duration(duration_ms),
                )
                .await;
                Ok(value)
            }
            Err(error) => {
                warn!(%stage, duration_ms, error = %error, kind = ?error.kind(), "Stage failed");
                self.record(
                    JobEvent::new(
                        &job.job_id,
                        EventType::StageFailed,
                        stage,
                        format!("Stage '{}' failed", stage),
                    )
                    .with_duration(duration_ms)
                    .with_error(error.to_string()),
                )
                .await;
                Err(StageFailure { stage, error })
            }
        }
    }

    /// Resolve the media, transcribe it, and write the source caption document
    async fn transcribe(&self, job: &Job, dir: &Path) -> Result<Captioned, StageError> {
        let media = media::resolve_source(&job.source, dir, &job.job_id).await?;
        let transcript = self.collaborators.transcriber.transcribe(&media).await?;

        if transcript.words.is_empty() {
            return Err(StageError::collaborator(
                "speech-to-text",
                "no word-level timestamps in transcript",
            ));
        }

        let path = dir.join("captions.srt");
        fs::write(&path, write_srt(&build_captions(&transcript.words))).await?;

        // Translations start from the document as written, not the in-memory blocks
        let entries = parse_srt(&fs::read_to_string(&path).await?)?;
        debug!(words = transcript.words.len(), captions = entries.len(), "Captions written");

        Ok(Captioned {
            transcript,
            path,
            entries,
        })
    }

    /// Merge structural and suggested chapters into the chapter document
    async fn chapters(&self, transcript: &Transcript, dir: &Path) -> Result<PathBuf, StageError> {
        let suggested = suggest_chapters(self.collaborators.llm.as_ref(), &transcript.text).await?;
        let merged = reconcile(&transcript.chapters, &suggested);
        debug!(
            structural = transcript.chapters.len(),
            suggested = suggested.len(),
            merged = merged.len(),
            "Chapters reconciled"
        );

        let path = dir.join("chapters.json");
        fs::write(&path, serde_json::to_vec_pretty(&merged)?).await?;
        Ok(path)
    }

    /// Translate into every target language concurrently
    async fn translate(
        &self,
        job: &Job,
        entries: &[CaptionEntry],
        dir: &Path,
    ) -> Result<Vec<(Language, PathBuf)>, StageError> {
        let entries: Arc<[CaptionEntry]> = entries.into();
        let mut tasks = JoinSet::new();

        for &language in &job.target_languages {
            let llm = Arc::clone(&self.collaborators.llm);
            let entries = Arc::clone(&entries);
            let path = dir.join(format!("captions_{}.srt", language.code()));

            tasks.spawn(
                async move {
                    let result = async {
                        let translated = translate_captions(llm.as_ref(), &entries, language).await?;
                        fs::write(&path, write_srt(&translated)).await?;
                        Ok::<_, StageError>(path)
                    }
                    .await;
                    (language, result)
                }
                .in_current_span(),
            );
        }

        let mut finished: HashMap<Language, PathBuf> = HashMap::new();
        let mut failed = 0usize;

        while let Some(joined) = tasks.join_next().await {
            let (language, result) = joined
                .map_err(|e| StageError::Fatal(format!("translation task aborted: {}", e)))?;

            match result {
                Ok(path) => {
                    debug!(%language, "Translation finished");
                    finished.insert(language, path);
                }
                Err(e) => match self.translation {
                    // Dropping the set aborts the remaining languages
                    TranslationPolicy::AllOrNothing => {
                        warn!(%language, error = %e, "Translation failed");
                        return Err(e);
                    }
                    TranslationPolicy::BestEffort => {
                        warn!(%language, error = %e, "Translation failed, omitting language");
                        failed += 1;
                        if failed == job.target_languages.len() {
                            return Err(e);
                        }
                    }
                },
            }
        }

        Ok(job
            .target_languages
            .iter()
            .filter_map(|language| finished.remove(language).map(|path| (*language, path)))
            .collect())
    }

    /// Upload every artifact under its deterministic key
    async fn publish(
        &self,
        job: &Job,
        captions: &Path,
        chapters: &Path,
        translations: &[(Language, PathBuf)],
    ) -> Result<ArtifactUrls, StageError> {
        let mut uploads = vec![
            (ArtifactCategory::Captions, "source".to_string(), captions),
            (ArtifactCategory::Chapters, "reconciled".to_string(), chapters),
        ];
        for (language, path) in translations {
            uploads.push((
                ArtifactCategory::Translations,
                language.code().to_string(),
                path.as_path(),
            ));
        }

        let mut results = ArtifactUrls::new();
        for (category, sub_key, path) in uploads {
            let key = artifact_key(&job.job_id, category, &sub_key);
            let url = self.collaborators.store.upload(path, &key).await?;
            debug!(%key, %url, "Artifact published");
            results.entry(category).or_default().insert(sub_key, url);
        }

        Ok(results)
    }

    async fn notify(&self, job: &Job, result: &JobResult) -> bool {
        self.record(JobEvent::new(
            &job.job_id,
            EventType::StageStarted,
            Stage::Notifying,
            format!("Notifying {}", job.callback_url),
        ))
        .await;

        let delivered = self
            .collaborators
            .notifier
            .notify(&job.callback_url, result)
            .await;

        let event = if delivered {
            JobEvent::new(
                &job.job_id,
                EventType::CallbackDelivered,
                Stage::Notifying,
                "Callback delivered",
            )
        } else {
            // Reported, not retried: the job outcome is already final
            warn!(callback_url = %job.callback_url, "Callback not delivered");
            JobEvent::new(
                &job.job_id,
                EventType::CallbackFailed,
                Stage::Notifying,
                "Callback retries exhausted",
            )
        };
        self.record(event).await;

        delivered
    }

    fn scratch_dir(&self) -> Result<TempDir, StageError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("mediaq-job-");

        let dir = match &self.scratch_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    /// Journal writes never fail a job
    async fn record(&self, event: JobEvent) {
        if let Err(e) = self.journal.append(&event).await {
            warn!(error = %e, event_type = ?event.event_type, "Failed to write journal event");
        }
    }
}
