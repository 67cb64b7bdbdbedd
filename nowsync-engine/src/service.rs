//! Sync service
//!
//! Cloneable async handle around one [`SyncEngine`]. Owns:
//!
//! - the engine behind a mutex (all engine calls are synchronous and short)
//! - the position poll task, cancellable through a `CancellationToken`
//! - a broadcast [`EventBus`] relaying every bus event to async transports
//!
//! **Poll loop:** one tick per configured interval. Each tick fetches a sample
//! with a bounded timeout and folds it through `update_position`, keeping the
//! current play state. Failed or timed-out fetches are logged and skipped.
//! Cancelling stops the timer immediately; a fetch still in flight is dropped
//! and its result never applied.

use crate::engine::SyncEngine;
use crate::position::PositionState;
use crate::source::{PositionReport, PositionSource};
use chrono::{DateTime, Utc};
use nowsync_common::config::SyncConfig;
use nowsync_common::events::{EventBus, LyricLine, SyncEvent};
use nowsync_common::time::Clock;
use nowsync_common::Result;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct PollHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Shared handle to the sync engine
#[derive(Clone)]
pub struct SyncService {
    engine: Arc<Mutex<SyncEngine>>,
    events: EventBus,
    poll: Arc<Mutex<Option<PollHandle>>>,
    poll_interval: Duration,
    fetch_timeout: Duration,
}

impl SyncService {
    pub fn new(config: &SyncConfig, clock: Arc<dyn Clock>) -> Self {
        let events = EventBus::new(config.event_channel_capacity);
        let engine = SyncEngine::new(config, clock);

        let relay = events.clone();
        engine.bus().on_any(move |event| relay.emit_lossy(event.clone()));

        Self {
            engine: Arc::new(Mutex::new(engine)),
            events,
            poll: Arc::new(Mutex::new(None)),
            poll_interval: config.poll_interval(),
            fetch_timeout: config.source_timeout(),
        }
    }

    /// Install a pull-based source and (re)start polling
    ///
    /// Replaces any previously installed source. Must be called from within a
    /// Tokio runtime.
    pub fn initialize(&self, source: Arc<dyn PositionSource>) {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            self.engine.clone(),
            source,
            self.poll_interval,
            self.fetch_timeout,
            cancel.clone(),
        ));

        let previous = lock(&self.poll).replace(PollHandle { cancel, task });
        if let Some(previous) = previous {
            previous.cancel.cancel();
            debug!("Replaced previous position source");
        }
        info!("Position polling started ({:?} interval)", self.poll_interval);
    }

    /// Stop polling; returns false when no source was installed
    pub fn stop_polling(&self) -> bool {
        match lock(&self.poll).take() {
            Some(handle) => {
                handle.cancel.cancel();
                info!("Position polling stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.poll)
            .as_ref()
            .map(|handle| !handle.task.is_finished())
            .unwrap_or(false)
    }

    /// Push an authoritative sample (e.g. from a session event)
    pub fn update_position(&self, position: f64, is_playing: bool, timestamp: Option<DateTime<Utc>>) {
        lock(&self.engine).update_position(position, is_playing, timestamp);
    }

    pub fn set_track_info(&self, length: f64, lines: Vec<LyricLine>) -> Result<()> {
        lock(&self.engine).set_track_info(length, lines)
    }

    pub fn position(&self) -> PositionState {
        lock(&self.engine).position()
    }

    pub fn lyrics_position(&self) -> PositionState {
        lock(&self.engine).lyrics_position()
    }

    /// Returns the clamped value now in effect
    pub fn set_compensation(&self, compensation_ms: f64) -> f64 {
        lock(&self.engine).set_compensation(compensation_ms)
    }

    pub fn set_sync_threshold(&self, threshold_secs: f64) {
        lock(&self.engine).set_sync_threshold(threshold_secs);
    }

    /// Current `(line, word)` of the lyrics cursor
    pub fn lyrics_cursor(&self) -> (Option<usize>, Option<usize>) {
        let engine = lock(&self.engine);
        (engine.current_line_index(), engine.current_word_index())
    }

    /// Subscribe to the event relay
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    /// Run `f` with exclusive access to the engine
    ///
    /// `f` must not call back into this service.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut SyncEngine) -> R) -> R {
        f(&mut lock(&self.engine))
    }

    /// Stop polling and drop every engine subscription, the event relay included
    pub fn cleanup(&self) {
        self.stop_polling();
        lock(&self.engine).cleanup();
        info!("Sync service cleaned up");
    }
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("poll_interval", &self.poll_interval)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("polling", &self.is_polling())
            .finish_non_exhaustive()
    }
}

async fn poll_loop(
    engine: Arc<Mutex<SyncEngine>>,
    source: Arc<dyn PositionSource>,
    period: Duration,
    fetch_timeout: Duration,
    cancel: CancellationToken,
) {
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {}
        }

        let fetched = tokio::select! {
            _ = cancel.cancelled() => break,
            result = tokio::time::timeout(fetch_timeout, source.fetch_position()) => result,
        };

        match fetched {
            Ok(Ok(report)) => {
                if cancel.is_cancelled() {
                    break;
                }
                apply_report(&engine, report);
            }
            Ok(Err(e)) => warn!("Position fetch failed: {}", e),
            Err(_) => warn!("Position fetch timed out after {:?}", fetch_timeout),
        }
    }

    debug!("Poll loop exited");
}

fn apply_report(engine: &Mutex<SyncEngine>, report: PositionReport) {
    let mut engine = lock(engine);
    let is_playing = engine.is_playing();
    engine.update_position(report.position, is_playing, report.timestamp);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
