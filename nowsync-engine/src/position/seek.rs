//! Seek detection
//!
//! Pure classification of a new sample against the previous state. A sample is a
//! seek when it is far from both the previous position and the position that
//! continuous playback would have reached by the sample time.

use super::state::PositionState;
use chrono::{DateTime, Utc};
use nowsync_common::config::SyncConfig;
use nowsync_common::time::seconds_between;

/// Distance-threshold seek classifier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekDetector {
    threshold_secs: f64,
}

impl SeekDetector {
    pub fn new(threshold_secs: f64) -> Self {
        Self { threshold_secs }
    }

    /// Threshold derived from the poll interval (half the interval, floor 0.5s)
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.seek_threshold_secs())
    }

    pub fn threshold_secs(&self) -> f64 {
        self.threshold_secs
    }

    /// Where continuous playback from `previous` would be at `at`
    pub fn expected_position(previous: &PositionState, at: DateTime<Utc>) -> f64 {
        if previous.is_playing {
            previous.actual_position + seconds_between(previous.timestamp, at)
        } else {
            previous.actual_position
        }
    }

    /// Classify `position` sampled at `at`
    ///
    /// Does not look at whether the previous position was zero; suppressing
    /// seeks from the start of a track is the caller's call.
    pub fn is_seek(&self, previous: &PositionState, position: f64, at: DateTime<Utc>) -> bool {
        let jump = (position - previous.actual_position).abs();
        let drift = (position - Self::expected_position(previous, at)).abs();
        jump > self.threshold_secs && drift > self.threshold_secs
    }
}
