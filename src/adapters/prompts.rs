//! Language model tasks used by the pipeline: chapter suggestion and
//! caption translation.

use tracing::debug;

use super::{LanguageModel, Task};
use crate::core::StageError;
use crate::domain::{CaptionEntry, Chapter, Language};

const COLLABORATOR: &str = "language model";

const CHAPTER_SYSTEM: &str = "Generate chapter markers from transcript.";

const CHAPTER_INSTRUCTIONS: &str = "You are an assistant that creates chapter markers for \
educational videos. Given the transcript text, suggest chapters with start and end times in \
seconds and a short descriptive title. Return strictly a JSON array of objects with keys \
'start', 'end', 'title'.";

const TRANSLATION_SYSTEM: &str = "You are a translation assistant.";

/// Ask the model for chapter markers (seconds) covering `transcript_text`.
///
/// The reply must be a JSON array of `{start, end, title}`, optionally
/// wrapped in a fenced code block. Anything else is a malformed response.
pub async fn suggest_chapters(
    llm: &dyn LanguageModel,
    transcript_text: &str,
) -> Result<Vec<Chapter>, StageError> {
    let prompt = format!("{}\n{}", CHAPTER_INSTRUCTIONS, transcript_text);
    let reply = llm.complete(Task::Chapters, CHAPTER_SYSTEM, &prompt).await?;
    parse_chapters(&reply).map_err(|message| StageError::malformed(COLLABORATOR, message))
}

/// Translate every entry's text into `language`, keeping index and timing
pub async fn translate_captions(
    llm: &dyn LanguageModel,
    entries: &[CaptionEntry],
    language: Language,
) -> Result<Vec<CaptionEntry>, StageError> {
    let mut translated = Vec::with_capacity(entries.len());

    for entry in entries {
        let prompt = format!(
            "Translate this text into {} without changing meaning or length: '{}'",
            language.name(),
            entry.text
        );
        let reply = llm.complete(Task::Translation, TRANSLATION_SYSTEM, &prompt).await?;
        let text = join_lines(&reply);
        if text.is_empty() {
            return Err(StageError::malformed(
                COLLABORATOR,
                format!("empty translation for caption {}", entry.index),
            ));
        }
        translated.push(entry.with_text(text));
    }

    debug!(language = %language, entries = translated.len(), "Captions translated");
    Ok(translated)
}

/// Collapse a multi-line reply into one caption line
fn join_lines(reply: &str) -> String {
    reply
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_chapters(reply: &str) -> Result<Vec<Chapter>, String> {
    let body = strip_code_fence(reply.trim());
    let chapters: Vec<Chapter> =
        serde_json::from_str(body).map_err(|e| format!("expected a JSON array of chapters: {}", e))?;

    if let Some(bad) = chapters.iter().find(|c| !c.is_valid()) {
        return Err(format!(
            "chapter '{}' has start {} not before end {}",
            bad.title, bad.start, bad.end
        ));
    }

    Ok(chapters)
}

/// Strip a surrounding ```json ... ``` fence if present
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
