//! Lyrics line and word matching
//!
//! Line resolution uses right-open intervals: a timed line stays active until
//! the next line's start. Untimed lines never become active but do not stop the
//! scan either.

use nowsync_common::events::LyricLine;

/// Active line for position `p`
///
/// The greatest index `i` with `lines[i].time <= p` such that `i` is the last
/// line, or `lines[i + 1]` is untimed, or `p < lines[i + 1].time`.
pub fn resolve_line(lines: &[LyricLine], position: f64) -> Option<usize> {
    let mut active = None;
    for (index, line) in lines.iter().enumerate() {
        let Some(start) = line.time else {
            continue;
        };
        if position < start {
            continue;
        }
        let before_next = match lines.get(index + 1).and_then(|next| next.time) {
            Some(next_start) => position < next_start,
            None => true,
        };
        if before_next {
            active = Some(index);
        }
    }
    active
}

/// Active word within `line`: the last word whose start is at or before `position`
pub fn resolve_word(line: &LyricLine, position: f64) -> Option<usize> {
    line.words
        .as_ref()?
        .iter()
        .rposition(|word| word.start <= position)
}

/// Result of a cursor advance that passed the emission gate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LyricsMatch {
    pub line_index: Option<usize>,
    pub word_index: Option<usize>,
    pub position: f64,
}

/// Lyrics sync cursor
///
/// Tracks the last emitted line and the position it was emitted at. A new
/// match is reported only when the line differs from the last emitted one AND
/// the position moved by more than the sync threshold since that emission.
#[derive(Debug, Clone, PartialEq)]
pub struct LyricsCursor {
    line_index: Option<usize>,
    word_index: Option<usize>,
    last_emitted_position: f64,
}

impl Default for LyricsCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl LyricsCursor {
    pub fn new() -> Self {
        Self {
            line_index: None,
            word_index: None,
            // Any real position passes the distance gate after a reset
            last_emitted_position: -1.0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn line_index(&self) -> Option<usize> {
        self.line_index
    }

    pub fn word_index(&self) -> Option<usize> {
        self.word_index
    }

    pub fn last_emitted_position(&self) -> f64 {
        self.last_emitted_position
    }

    /// Re-evaluate the cursor at `position`
    ///
    /// Returns the new match when the emission gate passes. Word progress inside
    /// the current line is tracked without producing a match.
    pub fn advance(
        &mut self,
        lines: &[LyricLine],
        position: f64,
        threshold_secs: f64,
    ) -> Option<LyricsMatch> {
        let line_index = resolve_line(lines, position);
        let word_index = line_index
            .and_then(|index| lines.get(index))
            .and_then(|line| resolve_word(line, position));

        let line_changed = line_index != self.line_index;
        let moved = (position - self.last_emitted_position).abs() > threshold_secs;

        if line_changed && moved {
            self.line_index = line_index;
            self.word_index = word_index;
            self.last_emitted_position = position;
            return Some(LyricsMatch {
                line_index,
                word_index,
                position,
            });
        }

        if !line_changed {
            self.word_index = word_index;
        }
        None
    }
}
