//! Caption documents and the SubRip (`.srt`) codec.
//!
//! Times are carried as integer milliseconds. A document is written as
//! numbered blocks:
//!
//! ```text
//! 1
//! 00:00:01,000 --> 00:00:04,000
//! Hello there
//!
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest span a single caption block may cover
pub const MAX_CAPTION_DURATION_MS: u64 = 5_000;

/// Most words a single caption block may hold
pub const MAX_WORDS_PER_CAPTION: usize = 15;

/// Errors raised while parsing a caption document
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptionError {
    #[error("Invalid caption index on line {line}: '{value}'")]
    InvalidIndex { line: usize, value: String },

    #[error("Invalid timing line {line}: expected 'start --> end', got '{value}'")]
    InvalidTiming { line: usize, value: String },

    #[error("Invalid timestamp '{0}' (expected HH:MM:SS,mmm)")]
    InvalidTimestamp(String),

    #[error("Caption {index} ends before it starts")]
    NegativeDuration { index: usize },
}

/// One word of a word-level transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    pub start: u64,
    pub end: u64,
    pub text: String,
}

impl Word {
    pub fn new(start: u64, end: u64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// A single numbered caption block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionEntry {
    /// 1-based, contiguous within a document
    pub index: usize,
    pub start: u64,
    pub end: u64,
    pub text: String,
}

impl CaptionEntry {
    /// Copy of this entry carrying different text; timing and index are kept
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            index: self.index,
            start: self.start,
            end: self.end,
            text: text.into(),
        }
    }
}

/// Group word-level timings into caption blocks.
///
/// A block is closed before a word that would stretch it past
/// [`MAX_CAPTION_DURATION_MS`], or once it holds [`MAX_WORDS_PER_CAPTION`] words.
pub fn build_captions(words: &[Word]) -> Vec<CaptionEntry> {
    let mut entries = Vec::new();
    let mut block: Vec<&Word> = Vec::new();

    for word in words {
        if let Some(first) = block.first() {
            let too_long = word.end.saturating_sub(first.start) > MAX_CAPTION_DURATION_MS;
            if too_long || block.len() >= MAX_WORDS_PER_CAPTION {
                flush_block(&mut entries, &mut block);
            }
        }
        block.push(word);
    }
    flush_block(&mut entries, &mut block);

    entries
}

fn flush_block(entries: &mut Vec<CaptionEntry>, block: &mut Vec<&Word>) {
    let (Some(first), Some(last)) = (block.first(), block.last()) else {
        return;
    };

    let text = block
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    entries.push(CaptionEntry {
        index: entries.len() + 1,
        start: first.start,
        end: last.end,
        text,
    });
    block.clear();
}

/// Format milliseconds as `HH:MM:SS,mmm`
pub fn format_timestamp(ms: u64) -> String {
    let millis = ms % 1000;
    let total_secs = ms / 1000;
    let secs = total_secs % 60;
    let mins = (total_secs / 60) % 60;
    let hours = total_secs / 3600;

    format!("{:02}:{:02}:{:02},{:03}", hours, mins, secs, millis)
}

/// Parse `HH:MM:SS,mmm` (a `.` separator is accepted as well)
pub fn parse_timestamp(ts: &str) -> Result<u64, CaptionError> {
    let invalid = || CaptionError::InvalidTimestamp(ts.to_string());

    let (clock, millis) = ts
        .trim()
        .split_once([',', '.'])
        .ok_or_else(invalid)?;

    let parts: Vec<&str> = clock.split(':').collect();
    let [hours, mins, secs] = parts.as_slice() else {
        return Err(invalid());
    };

    let parse = |s: &str| s.parse::<u64>().map_err(|_| invalid());
    let (hours, mins, secs, millis) = (parse(*hours)?, parse(*mins)?, parse(*secs)?, parse(millis)?);

    if mins >= 60 || secs >= 60 || millis >= 1000 {
        return Err(invalid());
    }

    hours
        .checked_mul(3600)
        .and_then(|s| s.checked_add(mins * 60 + secs))
        .and_then(|s| s.checked_mul(1000))
        .and_then(|ms| ms.checked_add(millis))
        .ok_or_else(invalid)
}

/// Render entries as a SubRip document.
///
/// Blank lines inside an entry's text would end the block early, so they
/// are dropped.
pub fn write_srt(entries: &[CaptionEntry]) -> String {
    let mut output = String::new();

    for entry in entries {
        output.push_str(&format!("{}\n", entry.index));
        output.push_str(&format!(
            "{} --> {}\n",
            format_timestamp(entry.start),
            format_timestamp(entry.end)
        ));
        for line in entry.text.lines().filter(|l| !l.trim().is_empty()) {
            output.push_str(line);
            output.push('\n');
        }
        output.push('\n');
    }

    output
}

/// Parse a SubRip document.
///
/// Blocks with fewer than three lines (index, timing, text) are skipped.
/// Multi-line text is kept with `\n` separators.
pub fn parse_srt(content: &str) -> Result<Vec<CaptionEntry>, CaptionError> {
    let mut entries = Vec::new();
    let mut block: Vec<(usize, &str)> = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            if !block.is_empty() {
                if let Some(entry) = parse_block(&block)? {
                    entries.push(entry);
                }
                block.clear();
            }
            continue;
        }
        block.push((line_no + 1, line));
    }

    if !block.is_empty() {
        if let Some(entry) = parse_block(&block)? {
            entries.push(entry);
        }
    }

    Ok(entries)
}

fn parse_block(block: &[(usize, &str)]) -> Result<Option<CaptionEntry>, CaptionError> {
    if block.len() < 3 {
        return Ok(None);
    }

    let (index_line, index_str) = block[0];
    let index = index_str
        .trim()
        .trim_start_matches('\u{feff}')
        .parse::<usize>()
        .map_err(|_| CaptionError::InvalidIndex {
            line: index_line,
            value: index_str.to_string(),
        })?;

    let (timing_line, timing) = block[1];
    let (start, end) = timing
        .split_once("-->")
        .ok_or_else(|| CaptionError::InvalidTiming {
            line: timing_line,
            value: timing.to_string(),
        })?;
    let start = parse_timestamp(start)?;
    let end = parse_timestamp(end)?;

    if end < start {
        return Err(CaptionError::NegativeDuration { index });
    }

    let text = block[2..]
        .iter()
        .map(|(_, line)| *line)
        .collect::<Vec<_>>()
        .join("\n");

    Ok(Some(CaptionEntry {
        index,
        start,
        end,
        text,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "00:00:00,000");
        assert_eq!(format_timestamp(1_500), "00:00:01,500");
        assert_eq!(format_timestamp(3_723_004), "01:02:03,004");
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("01:02:03,004").unwrap(), 3_723_004);
        assert_eq!(parse_timestamp(" 00:00:05.250 ").unwrap(), 5_250);
        assert!(parse_timestamp("00:61:00,000").is_err());
        assert!(parse_timestamp("00:00:00").is_err());
        assert!(parse_timestamp("aa:00:00,000").is_err());
    }

    #[test]
    fn test_build_captions_splits_on_duration() {
        let words = vec![
            Word::new(0, 400, "Hello"),
            Word::new(500, 900, "world."),
            Word::new(4_800, 5_200, "Later"),
            Word::new(5_300, 5_600, "words"),
        ];

        let entries = build_captions(&words);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "Hello world.");
        assert_eq!((entries[0].start, entries[0].end), (0, 900));
        assert_eq!(entries[1].index, 2);
        assert_eq!(entries[1].text, "Later words");
        assert_eq!((entries[1].start, entries[1].end), (4_800, 5_600));
    }

    #[test]
    fn test_build_captions_splits_on_word_count() {
        let words: Vec<Word> = (0..20)
            .map(|i| Word::new(i * 100, i * 100 + 50, format!("w{}", i)))
            .collect();

        let entries = build_captions(&words);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text.split(' ').count(), MAX_WORDS_PER_CAPTION);
        assert_eq!(entries[1].text.split(' ').count(), 5);
        assert_eq!(entries[1].start, 1_500);
    }

    #[test]
    fn test_build_captions_empty() {
        assert!(build_captions(&[]).is_empty());
    }

    #[test]
    fn test_write_srt_format() {
        let entries = vec![CaptionEntry {
            index: 1,
            start: 1_000,
            end: 4_000,
            text: "Hello".to_string(),
        }];

        assert_eq!(write_srt(&entries), "1\n00:00:01,000 --> 00:00:04,000\nHello\n\n");
    }

    #[test]
    fn test_parse_srt_multiline_and_crlf() {
        let srt = "1\r\n00:00:01,000 --> 00:00:02,000\r\nLine one\r\nLine two\r\n\r\n2\r\n00:00:03,000 --> 00:00:04,000\r\nNext\r\n";
        let entries = parse_srt(srt).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "Line one\nLine two");
        assert_eq!(entries[1].start, 3_000);
    }

    #[test]
    fn test_parse_srt_skips_short_blocks() {
        let srt = "1\n00:00:01,000 --> 00:00:02,000\n\n2\n00:00:03,000 --> 00:00:04,000\nKept\n";
        let entries = parse_srt(srt).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].index, 2);
    }

    #[test]
    fn test_parse_srt_errors() {
        assert!(matches!(
            parse_srt("x\n00:00:01,000 --> 00:00:02,000\ntext\n"),
            Err(CaptionError::InvalidIndex { line: 1, .. })
        ));
        assert!(matches!(
            parse_srt("1\n00:00:01,000 -> 00:00:02,000\ntext\n"),
            Err(CaptionError::InvalidTiming { line: 2, .. })
        ));
        assert!(matches!(
            parse_srt("1\n00:00:03,000 --> 00:00:02,000\ntext\n"),
            Err(CaptionError::NegativeDuration { index: 1 })
        ));
    }

    #[test]
    fn test_with_text_keeps_timing() {
        let entry = CaptionEntry {
            index: 3,
            start: 10,
            end: 20,
            text: "hello".to_string(),
        };
        let translated = entry.with_text("bonjour");
        assert_eq!(translated.index, 3);
        assert_eq!((translated.start, translated.end), (10, 20));
        assert_eq!(translated.text, "bonjour");
    }
}
