//! Chapter markers.

use serde::{Deserialize, Serialize};

/// A titled span of the media, offsets in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub start: f64,
    pub end: f64,
    #[serde(alias = "headline")]
    pub title: String,
}

impl Chapter {
    pub fn new(start: f64, end: f64, title: impl Into<String>) -> Self {
        Self {
            start,
            end,
            title: title.into(),
        }
    }

    /// Whether `offset` falls inside `[start, end)`
    pub fn contains(&self, offset: f64) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Whether the span is well formed (`start < end`)
    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_is_half_open() {
        let chapter = Chapter::new(10.0, 20.0, "Intro");
        assert!(chapter.contains(10.0));
        assert!(chapter.contains(19.999));
        assert!(!chapter.contains(20.0));
        assert!(!chapter.contains(9.5));
    }

    #[test]
    fn test_headline_alias() {
        let chapter: Chapter =
            serde_json::from_str(r#"{"start": 0.0, "end": 4.5, "headline": "Opening"}"#).unwrap();
        assert_eq!(chapter.title, "Opening");
        assert!(chapter.is_valid());
    }
}
