//! Sync engine
//!
//! Composes one [`PositionManager`] with one [`SyncEventBus`] subscribed to it.
//! This is the unit the service layer and tests construct; there is no global
//! instance.

use crate::position::{PositionManager, PositionState};
use crate::sync::SyncEventBus;
use nowsync_common::config::SyncConfig;
use nowsync_common::events::LyricLine;
use nowsync_common::time::Clock;
use nowsync_common::{Error, Result};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct SyncEngine {
    manager: PositionManager,
    bus: SyncEventBus,
}

impl SyncEngine {
    pub fn new(config: &SyncConfig, clock: Arc<dyn Clock>) -> Self {
        let mut manager = PositionManager::new(config, clock.clone());
        let mut bus = SyncEventBus::new(clock, config.lyrics_sync_threshold_secs);
        bus.attach(&mut manager);
        Self { manager, bus }
    }

    /// Track change: load the line table, reset the lyrics cursor and re-baseline position
    ///
    /// # Errors
    ///
    /// `InvalidInput` when `length` is negative or not finite.
    pub fn set_track_info(&mut self, length: f64, lines: Vec<LyricLine>) -> Result<()> {
        if !length.is_finite() || length < 0.0 {
            return Err(Error::InvalidInput(format!(
                "track length must be a non-negative number of seconds, got {}",
                length
            )));
        }

        debug!(
            "Track changed: length {:.3}s, {} lyrics lines",
            length,
            lines.len()
        );
        self.bus.set_track(lines);
        self.manager.set_track_info(length);
        Ok(())
    }

    pub fn update_position(
        &mut self,
        position: f64,
        is_playing: bool,
        timestamp: Option<chrono::DateTime<chrono::Utc>>,
    ) {
        self.manager.update_position(position, is_playing, timestamp);
    }

    pub fn position(&self) -> PositionState {
        self.manager.get_position(false)
    }

    pub fn lyrics_position(&self) -> PositionState {
        self.manager.get_lyrics_position()
    }

    /// Uncompensated interpolated position in seconds
    pub fn current_position(&self) -> f64 {
        self.position().interpolated_position
    }

    pub fn is_playing(&self) -> bool {
        self.manager.is_playing()
    }

    /// Returns the clamped value now in effect
    pub fn set_compensation(&mut self, compensation_ms: f64) -> f64 {
        self.manager.set_compensation(compensation_ms)
    }

    pub fn set_sync_threshold(&self, threshold_secs: f64) {
        self.bus.set_sync_threshold(threshold_secs);
    }

    pub fn current_line_index(&self) -> Option<usize> {
        self.bus.current_line_index()
    }

    pub fn current_word_index(&self) -> Option<usize> {
        self.bus.current_word_index()
    }

    pub fn manager(&self) -> &PositionManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut PositionManager {
        &mut self.manager
    }

    pub fn bus(&self) -> &SyncEventBus {
        &self.bus
    }

    /// Drop all external subscriptions and return to the baseline state
    ///
    /// The bus stays attached to the manager, so the engine remains usable.
    pub fn cleanup(&mut self) {
        self.bus.clear_subscribers();
        self.bus.reset_cursor();
        self.manager.cleanup();
        self.bus.forget_attachments();
        self.bus.attach(&mut self.manager);
        debug!("Sync engine cleaned up");
    }
}
