//! Position state and notification types
//!
//! `PositionState` is the single live estimate for the active track. It is only
//! ever replaced by [`PositionManager`](super::PositionManager); reads hand out
//! derived copies.

use chrono::{DateTime, Utc};
use nowsync_common::events::Accuracy;
use serde::Serialize;

/// Reliability tier of a position estimate, driven by staleness
///
/// Ordered from least to most reliable so that `min` picks the weaker tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl From<Confidence> for Accuracy {
    fn from(confidence: Confidence) -> Self {
        match confidence {
            Confidence::High => Accuracy::High,
            Confidence::Medium => Accuracy::Medium,
            Confidence::Low => Accuracy::Low,
        }
    }
}

/// Best estimate of playback position
///
/// **Invariants:**
/// - `interpolated_position` lies in `[0, track_length]` on every read
/// - `actual_position` changes only on an explicit position update
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionState {
    /// Last real sample (seconds)
    pub actual_position: f64,
    /// Presentation-time estimate (seconds)
    pub interpolated_position: f64,
    /// Sample time on the stored state, read time on derived copies
    pub timestamp: DateTime<Utc>,
    pub is_playing: bool,
    pub is_interpolating: bool,
    pub confidence: Confidence,
}

impl PositionState {
    /// Zero/unknown baseline used at startup and on every track change
    pub fn baseline(at: DateTime<Utc>) -> Self {
        Self {
            actual_position: 0.0,
            interpolated_position: 0.0,
            timestamp: at,
            is_playing: false,
            is_interpolating: false,
            confidence: Confidence::Low,
        }
    }

    /// State right after a real sample has been folded in
    pub fn from_sample(sample: &PositionSample) -> Self {
        Self {
            actual_position: sample.position,
            interpolated_position: sample.position,
            timestamp: sample.timestamp,
            is_playing: sample.is_playing,
            is_interpolating: false,
            confidence: Confidence::High,
        }
    }
}

/// A single `(position, isPlaying, timestamp)` observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    pub position: f64,
    pub is_playing: bool,
    pub timestamp: DateTime<Utc>,
}

/// Discontinuous position change, emitted once per detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekEvent {
    pub from_position: f64,
    pub to_position: f64,
    /// Sample time of the sample that triggered the seek
    pub timestamp: DateTime<Utc>,
    pub confidence: Confidence,
}

/// Generic "position changed" notification
///
/// Carries both reads taken right after the update so listeners never need to
/// call back into the manager.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionChange {
    /// Uncompensated read
    pub position: PositionState,
    /// Compensated read for lyrics timing
    pub lyrics_position: PositionState,
}

/// Play/pause transition notification
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayStateChange {
    pub is_playing: bool,
    /// Uncompensated interpolated position at the transition
    pub position: f64,
}
