//! Position manager
//!
//! Owns the single authoritative [`PositionState`] for the active track and
//! reconciles sparse, irregular samples with continuous time:
//!
//! - `update_position` folds a real sample in, classifies seeks and notifies
//! - `get_position` interpolates forward from the last sample and degrades
//!   confidence with staleness, without mutating anything
//!
//! All mutation entry points are synchronous. The poll loop lives in
//! [`SyncService`](crate::SyncService); this type never suspends.

use super::seek::SeekDetector;
use super::state::{
    Confidence, PlayStateChange, PositionChange, PositionSample, PositionState, SeekEvent,
};
use crate::sync::listeners::{ListenerId, Listeners};
use chrono::{DateTime, Utc};
use nowsync_common::config::{clamp_compensation_ms, SyncConfig};
use nowsync_common::time::{seconds_between, Clock};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Reads closer than this to the last sample are returned without interpolation
const MIN_INTERPOLATION_SECS: f64 = 0.01;

/// Elapsed share of the interpolation window past which confidence drops to medium
const MEDIUM_CONFIDENCE_FRACTION: f64 = 0.5;

/// Elapsed share of the interpolation window past which confidence drops to low
const LOW_CONFIDENCE_FRACTION: f64 = 0.8;

/// Handle for a manager-level subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerListener {
    PositionChange(ListenerId),
    Seek(ListenerId),
    PlayState(ListenerId),
}

/// Authoritative playback position for the active track
pub struct PositionManager {
    clock: Arc<dyn Clock>,
    state: PositionState,
    track_length: f64,
    history: VecDeque<PositionSample>,
    history_capacity: usize,
    seek_detector: SeekDetector,
    max_interpolation_secs: f64,
    compensation_ms: f64,
    position_listeners: Listeners<PositionChange>,
    seek_listeners: Listeners<SeekEvent>,
    play_state_listeners: Listeners<PlayStateChange>,
}

impl PositionManager {
    /// Create a manager from sync settings
    ///
    /// Seek threshold and interpolation window are derived from the poll interval
    /// once, here.
    pub fn new(config: &SyncConfig, clock: Arc<dyn Clock>) -> Self {
        let state = PositionState::baseline(clock.now());
        Self {
            clock,
            state,
            track_length: 0.0,
            history: VecDeque::with_capacity(config.position_history_size),
            history_capacity: config.position_history_size.max(1),
            seek_detector: SeekDetector::from_config(config),
            max_interpolation_secs: config.max_interpolation_secs(),
            compensation_ms: config.compensation_ms(),
            position_listeners: Listeners::new("position change"),
            seek_listeners: Listeners::new("seek"),
            play_state_listeners: Listeners::new("play state"),
        }
    }

    /// Track-change boundary
    ///
    /// Sets the track length and re-baselines the state to position 0, not
    /// playing, low confidence. Sample history is cleared. Negative or
    /// non-finite lengths are treated as 0.
    pub fn set_track_info(&mut self, length: f64) {
        self.track_length = sanitize_seconds(length);
        self.reset_state();
        debug!("Track info updated: length {:.3}s", self.track_length);
    }

    /// Fold a real sample into the state
    ///
    /// Single mutation entry point, used by the poll loop and by backends
    /// pushing authoritative updates. `timestamp` defaults to now. Negative or
    /// non-finite positions are clamped to 0.
    ///
    /// Notifications fire in this order: seek (if any), play-state transition
    /// (if any), position change (always).
    pub fn update_position(
        &mut self,
        position: f64,
        is_playing: bool,
        timestamp: Option<DateTime<Utc>>,
    ) {
        let at = timestamp.unwrap_or_else(|| self.clock.now());
        let sample = PositionSample {
            position: sanitize_seconds(position),
            is_playing,
            timestamp: at,
        };

        self.push_history(sample);

        let previous = std::mem::replace(&mut self.state, PositionState::from_sample(&sample));

        // A first sample after a track change always jumps away from 0
        if previous.actual_position > 0.0
            && self.seek_detector.is_seek(&previous, sample.position, at)
        {
            debug!(
                "Seek detected from {:.3} to {:.3}",
                previous.actual_position, sample.position
            );
            self.seek_listeners.emit(&SeekEvent {
                from_position: previous.actual_position,
                to_position: sample.position,
                timestamp: at,
                confidence: Confidence::High,
            });
        }

        if previous.is_playing != is_playing {
            let change = PlayStateChange {
                is_playing,
                position: self.get_position(false).interpolated_position,
            };
            self.play_state_listeners.emit(&change);
        }

        let change = PositionChange {
            position: self.get_position(false),
            lyrics_position: self.get_position(true),
        };
        self.position_listeners.emit(&change);
    }

    /// Presentation-time estimate (pure read)
    ///
    /// While playing, the position is extrapolated by the time elapsed since the
    /// last sample. Within the interpolation window confidence drops to medium
    /// past 50% and to low past 80% of it. Beyond the window the position keeps
    /// advancing with low confidence. With `with_compensation` the lyrics offset
    /// is added while playing. The result is clamped to `[0, track_length]`.
    ///
    /// The returned `timestamp` is the read time.
    pub fn get_position(&self, with_compensation: bool) -> PositionState {
        let now = self.clock.now();
        let elapsed = seconds_between(self.state.timestamp, now);

        let mut position = self.state.actual_position;
        let mut is_interpolating = false;
        let mut confidence = self.state.confidence;

        if self.state.is_playing && elapsed > MIN_INTERPOLATION_SECS {
            position += elapsed;
            is_interpolating = true;
            // Past the window counts as past 80% of it
            if elapsed > self.max_interpolation_secs * LOW_CONFIDENCE_FRACTION {
                confidence = Confidence::Low;
            } else if elapsed > self.max_interpolation_secs * MEDIUM_CONFIDENCE_FRACTION {
                confidence = confidence.min(Confidence::Medium);
            }
        }

        if with_compensation && self.state.is_playing {
            position += self.compensation_ms / 1000.0;
        }

        PositionState {
            actual_position: self.state.actual_position,
            interpolated_position: position.clamp(0.0, self.track_length),
            timestamp: now,
            is_playing: self.state.is_playing,
            is_interpolating,
            confidence,
        }
    }

    /// Compensated read for lyrics timing
    pub fn get_lyrics_position(&self) -> PositionState {
        self.get_position(true)
    }

    /// Set the lyrics compensation offset
    ///
    /// Clamped to `0..=2000` ms and applied to subsequent reads. Returns the
    /// value actually stored.
    pub fn set_compensation(&mut self, compensation_ms: f64) -> f64 {
        self.compensation_ms = clamp_compensation_ms(compensation_ms);
        debug!("Compensation set to {}ms", self.compensation_ms);
        self.compensation_ms
    }

    pub fn compensation_ms(&self) -> f64 {
        self.compensation_ms
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    pub fn track_length(&self) -> f64 {
        self.track_length
    }

    /// Stored state as of the last sample (no interpolation)
    pub fn state(&self) -> &PositionState {
        &self.state
    }

    /// Recent raw samples, oldest first
    pub fn history(&self) -> impl Iterator<Item = &PositionSample> {
        self.history.iter()
    }

    pub fn seek_threshold_secs(&self) -> f64 {
        self.seek_detector.threshold_secs()
    }

    pub fn max_interpolation_secs(&self) -> f64 {
        self.max_interpolation_secs
    }

    pub fn on_position_change<F>(&mut self, listener: F) -> ManagerListener
    where
        F: FnMut(&PositionChange) + Send + 'static,
    {
        ManagerListener::PositionChange(self.position_listeners.add(listener))
    }

    pub fn on_seek<F>(&mut self, listener: F) -> ManagerListener
    where
        F: FnMut(&SeekEvent) + Send + 'static,
    {
        ManagerListener::Seek(self.seek_listeners.add(listener))
    }

    pub fn on_play_state_change<F>(&mut self, listener: F) -> ManagerListener
    where
        F: FnMut(&PlayStateChange) + Send + 'static,
    {
        ManagerListener::PlayState(self.play_state_listeners.add(listener))
    }

    /// Returns false when the handle was already removed
    pub fn unsubscribe(&mut self, handle: ManagerListener) -> bool {
        match handle {
            ManagerListener::PositionChange(id) => self.position_listeners.remove(id),
            ManagerListener::Seek(id) => self.seek_listeners.remove(id),
            ManagerListener::PlayState(id) => self.play_state_listeners.remove(id),
        }
    }

    /// Drop every subscription and return to the baseline state
    ///
    /// Track length and compensation are kept.
    pub fn cleanup(&mut self) {
        self.position_listeners.clear();
        self.seek_listeners.clear();
        self.play_state_listeners.clear();
        self.reset_state();
        debug!("Position manager cleaned up");
    }

    fn reset_state(&mut self) {
        self.state = PositionState::baseline(self.clock.now());
        self.history.clear();
    }

    fn push_history(&mut self, sample: PositionSample) {
        if self.history.len() == self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(sample);
    }
}

impl std::fmt::Debug for PositionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionManager")
            .field("state", &self.state)
            .field("track_length", &self.track_length)
            .field("compensation_ms", &self.compensation_ms)
            .finish_non_exhaustive()
    }
}

/// Negative and non-finite seconds become 0
fn sanitize_seconds(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nowsync_common::time::ManualClock;
    use std::sync::Mutex;

    fn manager_with_clock() -> (PositionManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let mut manager = PositionManager::new(&SyncConfig::default(), clock.clone());
        manager.set_track_info(180.0);
        (manager, clock)
    }

    #[test]
    fn test_initial_read_is_baseline() {
        let (manager, _clock) = manager_with_clock();
        let read = manager.get_position(false);

        assert_eq!(read.interpolated_position, 0.0);
        assert!(!read.is_playing);
        assert_eq!(read.confidence, Confidence::Low);
    }

    #[test]
    fn test_update_resets_confidence_and_stops_interpolating() {
        let (mut manager, clock) = manager_with_clock();
        manager.update_position(10.0, true, None);

        let read = manager.get_position(false);
        assert_eq!(read.interpolated_position, 10.0);
        assert_eq!(read.confidence, Confidence::High);
        assert!(!read.is_interpolating);
        assert_eq!(read.timestamp, clock.now());
    }

    #[test]
    fn test_interpolation_and_confidence_decay() {
        let (mut manager, clock) = manager_with_clock();
        // Default window: 2s
        manager.update_position(10.0, true, None);

        clock.advance_secs(0.5);
        let read = manager.get_position(false);
        assert!((read.interpolated_position - 10.5).abs() < 1e-6);
        assert!(read.is_interpolating);
        assert_eq!(read.confidence, Confidence::High);

        clock.advance_secs(0.7); // 1.2s: past 50%
        assert_eq!(manager.get_position(false).confidence, Confidence::Medium);

        clock.advance_secs(0.5); // 1.7s: past 80%
        assert_eq!(manager.get_position(false).confidence, Confidence::Low);

        clock.advance_secs(2.0); // 3.7s: beyond the window
        let stale = manager.get_position(false);
        assert_eq!(stale.confidence, Confidence::Low);
        assert!(stale.is_interpolating);
        assert!((stale.interpolated_position - 13.7).abs() < 1e-6);
    }

    #[test]
    fn test_reads_do_not_mutate_state() {
        let (mut manager, clock) = manager_with_clock();
        manager.update_position(10.0, true, None);
        clock.advance_secs(1.0);

        let before = manager.state().clone();
        let _ = manager.get_position(true);
        let _ = manager.get_lyrics_position();
        assert_eq!(*manager.state(), before);
    }

    #[test]
    fn test_paused_reads_do_not_interpolate() {
        let (mut manager, clock) = manager_with_clock();
        manager.update_position(30.0, false, None);
        clock.advance_secs(5.0);

        let read = manager.get_lyrics_position();
        assert_eq!(read.interpolated_position, 30.0);
        assert_eq!(read.confidence, Confidence::High);
        assert!(!read.is_interpolating);
    }

    #[test]
    fn test_compensation_only_applies_while_playing() {
        let (mut manager, _clock) = manager_with_clock();
        manager.update_position(20.0, true, None);
        assert!((manager.get_lyrics_position().interpolated_position - 20.2).abs() < 1e-9);

        assert_eq!(manager.set_compensation(5000.0), 2000.0);
        assert!((manager.get_lyrics_position().interpolated_position - 22.0).abs() < 1e-9);

        assert_eq!(manager.set_compensation(-10.0), 0.0);
        assert_eq!(manager.get_lyrics_position().interpolated_position, 20.0);
    }

    #[test]
    fn test_clamps_to_track_bounds() {
        let (mut manager, clock) = manager_with_clock();
        manager.update_position(1000.0, true, None);
        assert_eq!(manager.get_position(false).interpolated_position, 180.0);

        manager.update_position(-5.0, true, None);
        assert_eq!(manager.state().actual_position, 0.0);
        assert_eq!(manager.get_position(false).interpolated_position, 0.0);

        manager.update_position(179.9, true, None);
        clock.advance_secs(1.0);
        assert_eq!(manager.get_lyrics_position().interpolated_position, 180.0);

        manager.update_position(f64::NAN, true, None);
        assert_eq!(manager.state().actual_position, 0.0);
    }

    #[test]
    fn test_zero_track_length_pins_reads_to_zero() {
        let clock = Arc::new(ManualClock::default());
        let mut manager = PositionManager::new(&SyncConfig::default(), clock);
        manager.update_position(42.0, true, None);

        assert_eq!(manager.state().actual_position, 42.0);
        assert_eq!(manager.get_position(false).interpolated_position, 0.0);
    }

    #[test]
    fn test_seek_emitted_once_for_discontinuity() {
        let (mut manager, clock) = manager_with_clock();
        let seeks = Arc::new(Mutex::new(Vec::new()));
        let sink = seeks.clone();
        manager.on_seek(move |event| sink.lock().unwrap().push(*event));

        let t0 = clock.now();
        manager.update_position(50.0, true, Some(t0));
        clock.advance_secs(1.0);
        manager.update_position(80.0, true, Some(clock.now()));

        let seeks = seeks.lock().unwrap();
        assert_eq!(seeks.len(), 1);
        assert_eq!(seeks[0].from_position, 50.0);
        assert_eq!(seeks[0].to_position, 80.0);
        assert_eq!(seeks[0].confidence, Confidence::High);
    }

    #[test]
    fn test_no_seek_from_zero() {
        let (mut manager, _clock) = manager_with_clock();
        let seeks = Arc::new(Mutex::new(0));
        let sink = seeks.clone();
        manager.on_seek(move |_| *sink.lock().unwrap() += 1);

        manager.update_position(95.0, true, None);
        assert_eq!(*seeks.lock().unwrap(), 0);
    }

    #[test]
    fn test_play_state_change_fires_on_transition_only() {
        let (mut manager, _clock) = manager_with_clock();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = changes.clone();
        manager.on_play_state_change(move |change| sink.lock().unwrap().push(*change));

        manager.update_position(30.0, true, None);
        manager.update_position(30.0, true, None);
        manager.update_position(30.0, false, None);

        let changes = changes.lock().unwrap();
        assert_eq!(changes.len(), 2);
        assert!(changes[0].is_playing);
        assert!(!changes[1].is_playing);
        assert_eq!(changes[1].position, 30.0);
    }

    #[test]
    fn test_position_change_carries_both_reads() {
        let (mut manager, _clock) = manager_with_clock();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = changes.clone();
        manager.on_position_change(move |change| sink.lock().unwrap().push(change.clone()));

        manager.update_position(12.0, true, None);

        let changes = changes.lock().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].position.interpolated_position, 12.0);
        assert!((changes[0].lyrics_position.interpolated_position - 12.2).abs() < 1e-9);
    }

    #[test]
    fn test_notification_order_is_seek_play_state_position() {
        let (mut manager, clock) = manager_with_clock();
        let order = Arc::new(Mutex::new(Vec::new()));

        let sink = order.clone();
        manager.on_position_change(move |_| sink.lock().unwrap().push("position"));
        let sink = order.clone();
        manager.on_play_state_change(move |_| sink.lock().unwrap().push("play_state"));
        let sink = order.clone();
        manager.on_seek(move |_| sink.lock().unwrap().push("seek"));

        manager.update_position(50.0, false, None);
        order.lock().unwrap().clear();

        clock.advance_secs(1.0);
        manager.update_position(90.0, true, None);

        assert_eq!(*order.lock().unwrap(), vec!["seek", "play_state", "position"]);
    }

    #[test]
    fn test_history_is_bounded() {
        let (mut manager, _clock) = manager_with_clock();
        for i in 0..8 {
            manager.update_position(i as f64, true, None);
        }

        let positions: Vec<f64> = manager.history().map(|s| s.position).collect();
        assert_eq!(positions, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_set_track_info_rebaselines() {
        let (mut manager, _clock) = manager_with_clock();
        manager.update_position(60.0, true, None);

        manager.set_track_info(240.0);

        assert_eq!(manager.track_length(), 240.0);
        assert_eq!(*manager.state(), PositionState::baseline(manager.state().timestamp));
        assert_eq!(manager.history().count(), 0);

        manager.set_track_info(-3.0);
        assert_eq!(manager.track_length(), 0.0);
    }

    #[test]
    fn test_unsubscribe_and_cleanup() {
        let (mut manager, _clock) = manager_with_clock();
        let count = Arc::new(Mutex::new(0));

        let sink = count.clone();
        let handle = manager.on_position_change(move |_| *sink.lock().unwrap() += 1);
        manager.update_position(1.0, true, None);
        assert!(manager.unsubscribe(handle));
        assert!(!manager.unsubscribe(handle));
        manager.update_position(2.0, true, None);
        assert_eq!(*count.lock().unwrap(), 1);

        let sink = count.clone();
        manager.on_position_change(move |_| *sink.lock().unwrap() += 1);
        manager.cleanup();
        manager.update_position(3.0, true, None);
        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(manager.track_length(), 180.0);
    }
}
