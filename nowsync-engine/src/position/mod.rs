//! Position tracking
//!
//! Turns sparse `(position, isPlaying, timestamp)` samples into a continuously
//! interpolated, confidence-rated timeline and detects seeks.

pub mod manager;
pub mod seek;
pub mod state;

pub use manager::{ManagerListener, PositionManager};
pub use seek::SeekDetector;
pub use state::{
    Confidence, PlayStateChange, PositionChange, PositionSample, PositionState, SeekEvent,
};
