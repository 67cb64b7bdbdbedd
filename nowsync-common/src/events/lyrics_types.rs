//! Lyrics line table types
//!
//! Timed lines (and optional timed word spans) as supplied by a lyrics provider.
//! The sync engine only matches positions against these; it never derives timing.

use serde::{Deserialize, Serialize};

/// A single lyrics line
///
/// Lines without a `time` are displayed but never act as sync boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricLine {
    /// Line start in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    pub text: String,
    /// Timed word spans for karaoke-style highlighting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<LyricWord>>,
}

impl LyricLine {
    pub fn timed(time: f64, text: impl Into<String>) -> Self {
        Self {
            time: Some(time),
            text: text.into(),
            words: None,
        }
    }

    pub fn untimed(text: impl Into<String>) -> Self {
        Self {
            time: None,
            text: text.into(),
            words: None,
        }
    }

    pub fn with_words(mut self, words: Vec<LyricWord>) -> Self {
        self.words = Some(words);
        self
    }
}

/// A timed word span within a line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricWord {
    /// Word start in seconds
    pub start: f64,
    pub text: String,
}

impl LyricWord {
    pub fn new(start: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            text: text.into(),
        }
    }
}
