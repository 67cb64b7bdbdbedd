//! Playback-related type definitions
//!
//! Supporting types carried by the externally visible sync events.

use serde::{Deserialize, Serialize};

/// Playback state enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
}

impl PlaybackState {
    /// Map a play/pause flag to the transition state reported to clients
    pub fn from_playing(is_playing: bool) -> Self {
        if is_playing {
            PlaybackState::Playing
        } else {
            PlaybackState::Paused
        }
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
        }
    }
}

/// Reliability tier of a position estimate
///
/// Ordered from least to most reliable so that `min` picks the weaker tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Accuracy {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Accuracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Accuracy::Low => write!(f, "low"),
            Accuracy::Medium => write!(f, "medium"),
            Accuracy::High => write!(f, "high"),
        }
    }
}
