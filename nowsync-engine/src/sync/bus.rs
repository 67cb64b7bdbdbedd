//! Sync event bus
//!
//! Subscribes to [`PositionManager`] notifications, keeps the lyrics cursor for
//! the loaded line table, and republishes four typed event families:
//!
//! - `lyrics.sync` on active line changes (gated, see [`LyricsCursor`])
//! - `position.update` for every position change
//! - `playback.state` for every play/pause transition
//! - `position.seek` for every detected seek
//!
//! Delivery is synchronous and in registration order. Every event is stamped
//! with the wall-clock time of emission. Subscribers must not call back into
//! the bus or the manager from inside a callback.

use super::listeners::{ListenerId, Listeners};
use super::lyrics::LyricsCursor;
use crate::position::{ManagerListener, PlayStateChange, PositionChange, PositionManager, SeekEvent};
use nowsync_common::events::{
    EventFamily, LyricLine, LyricsSyncEvent, PlaybackState, PlaybackStateEvent, PositionSeekEvent,
    PositionUpdateEvent, SyncEvent,
};
use nowsync_common::time::Clock;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Handle returned by every subscribe call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    /// `None` for all-events subscriptions
    family: Option<EventFamily>,
    id: ListenerId,
}

impl Subscription {
    pub fn family(&self) -> Option<EventFamily> {
        self.family
    }
}

struct BusInner {
    clock: Arc<dyn Clock>,
    lines: Vec<LyricLine>,
    cursor: LyricsCursor,
    sync_threshold_secs: f64,
    lyrics_sync: Listeners<SyncEvent>,
    position_update: Listeners<SyncEvent>,
    playback_state: Listeners<SyncEvent>,
    seek: Listeners<SyncEvent>,
    any: Listeners<SyncEvent>,
}

impl BusInner {
    fn listeners_mut(&mut self, family: EventFamily) -> &mut Listeners<SyncEvent> {
        match family {
            EventFamily::LyricsSync => &mut self.lyrics_sync,
            EventFamily::PositionUpdate => &mut self.position_update,
            EventFamily::PlaybackState => &mut self.playback_state,
            EventFamily::Seek => &mut self.seek,
        }
    }

    fn listeners(&self, family: EventFamily) -> &Listeners<SyncEvent> {
        match family {
            EventFamily::LyricsSync => &self.lyrics_sync,
            EventFamily::PositionUpdate => &self.position_update,
            EventFamily::PlaybackState => &self.playback_state,
            EventFamily::Seek => &self.seek,
        }
    }

    fn publish(&mut self, event: SyncEvent) {
        self.listeners_mut(event.family()).emit(&event);
        self.any.emit(&event);
    }

    fn on_position_change(&mut self, change: &PositionChange) {
        if change.position.is_playing && !self.lines.is_empty() {
            self.check_lyrics_sync(change.lyrics_position.interpolated_position);
        }

        let event = SyncEvent::PositionUpdate(PositionUpdateEvent {
            timestamp: self.clock.now(),
            position: change.position.interpolated_position,
            is_playing: change.position.is_playing,
            accuracy: change.position.confidence.into(),
        });
        self.publish(event);
    }

    fn check_lyrics_sync(&mut self, lyrics_position: f64) {
        let Some(hit) = self
            .cursor
            .advance(&self.lines, lyrics_position, self.sync_threshold_secs)
        else {
            return;
        };

        debug!(
            "Lyrics sync: line {:?} at position {:.3}",
            hit.line_index, hit.position
        );
        let event = SyncEvent::LyricsSync(LyricsSyncEvent {
            timestamp: self.clock.now(),
            position: hit.position,
            line_index: hit.line_index,
            word_index: hit.word_index,
        });
        self.publish(event);
    }

    fn on_play_state_change(&mut self, change: &PlayStateChange) {
        let event = SyncEvent::PlaybackState(PlaybackStateEvent {
            timestamp: self.clock.now(),
            state: PlaybackState::from_playing(change.is_playing),
            position: change.position,
        });
        self.publish(event);
    }

    fn on_seek(&mut self, seek: &SeekEvent) {
        debug!(
            "Seek forwarded from {:.3} to {:.3}",
            seek.from_position, seek.to_position
        );
        let event = SyncEvent::Seek(PositionSeekEvent {
            timestamp: self.clock.now(),
            from_position: seek.from_position,
            to_position: seek.to_position,
        });
        self.publish(event);
    }
}

/// Typed publish/subscribe hub for synchronized events
pub struct SyncEventBus {
    inner: Arc<Mutex<BusInner>>,
    attachments: Vec<ManagerListener>,
}

impl SyncEventBus {
    pub fn new(clock: Arc<dyn Clock>, sync_threshold_secs: f64) -> Self {
        let inner = BusInner {
            clock,
            lines: Vec::new(),
            cursor: LyricsCursor::new(),
            sync_threshold_secs: sanitize_threshold(sync_threshold_secs),
            lyrics_sync: Listeners::new("lyrics.sync"),
            position_update: Listeners::new("position.update"),
            playback_state: Listeners::new("playback.state"),
            seek: Listeners::new("position.seek"),
            any: Listeners::new("sync event"),
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
            attachments: Vec::new(),
        }
    }

    /// Subscribe to the manager's position, play-state and seek notifications
    ///
    /// Attaching twice is a no-op.
    pub fn attach(&mut self, manager: &mut PositionManager) {
        if !self.attachments.is_empty() {
            return;
        }

        let inner = self.inner.clone();
        self.attachments.push(manager.on_position_change(move |change| {
            lock(&inner).on_position_change(change);
        }));

        let inner = self.inner.clone();
        self.attachments.push(manager.on_play_state_change(move |change| {
            lock(&inner).on_play_state_change(change);
        }));

        let inner = self.inner.clone();
        self.attachments.push(manager.on_seek(move |seek| {
            lock(&inner).on_seek(seek);
        }));
    }

    /// Remove the manager subscriptions installed by [`attach`](Self::attach)
    pub fn detach(&mut self, manager: &mut PositionManager) {
        for handle in self.attachments.drain(..) {
            manager.unsubscribe(handle);
        }
    }

    /// Forget the manager subscriptions without touching the manager
    ///
    /// For when the manager already dropped its listeners itself.
    pub(crate) fn forget_attachments(&mut self) {
        self.attachments.clear();
    }

    pub fn is_attached(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// Replace the line table and reset the lyrics cursor
    pub fn set_track(&self, lines: Vec<LyricLine>) {
        let mut inner = lock(&self.inner);
        inner.lines = lines;
        inner.cursor.reset();
    }

    pub fn line_count(&self) -> usize {
        lock(&self.inner).lines.len()
    }

    /// Minimum movement between two `lyrics.sync` emissions (seconds)
    ///
    /// Negative or non-finite values are treated as 0.
    pub fn set_sync_threshold(&self, threshold_secs: f64) {
        lock(&self.inner).sync_threshold_secs = sanitize_threshold(threshold_secs);
    }

    pub fn sync_threshold(&self) -> f64 {
        lock(&self.inner).sync_threshold_secs
    }

    pub fn current_line_index(&self) -> Option<usize> {
        lock(&self.inner).cursor.line_index()
    }

    pub fn current_word_index(&self) -> Option<usize> {
        lock(&self.inner).cursor.word_index()
    }

    pub fn reset_cursor(&self) {
        lock(&self.inner).cursor.reset();
    }

    /// Subscribe to one event family
    pub fn subscribe<F>(&self, family: EventFamily, listener: F) -> Subscription
    where
        F: FnMut(&SyncEvent) + Send + 'static,
    {
        let id = lock(&self.inner).listeners_mut(family).add(listener);
        Subscription {
            family: Some(family),
            id,
        }
    }

    /// Subscribe to every event family
    ///
    /// All-events listeners run after the family listeners of each event.
    pub fn on_any<F>(&self, listener: F) -> Subscription
    where
        F: FnMut(&SyncEvent) + Send + 'static,
    {
        let id = lock(&self.inner).any.add(listener);
        Subscription { family: None, id }
    }

    pub fn on_lyrics_sync<F>(&self, mut listener: F) -> Subscription
    where
        F: FnMut(&LyricsSyncEvent) + Send + 'static,
    {
        self.subscribe(EventFamily::LyricsSync, move |event| {
            if let SyncEvent::LyricsSync(e) = event {
                listener(e);
            }
        })
    }

    pub fn on_position_update<F>(&self, mut listener: F) -> Subscription
    where
        F: FnMut(&PositionUpdateEvent) + Send + 'static,
    {
        self.subscribe(EventFamily::PositionUpdate, move |event| {
            if let SyncEvent::PositionUpdate(e) = event {
                listener(e);
            }
        })
    }

    pub fn on_playback_state<F>(&self, mut listener: F) -> Subscription
    where
        F: FnMut(&PlaybackStateEvent) + Send + 'static,
    {
        self.subscribe(EventFamily::PlaybackState, move |event| {
            if let SyncEvent::PlaybackState(e) = event {
                listener(e);
            }
        })
    }

    pub fn on_seek<F>(&self, mut listener: F) -> Subscription
    where
        F: FnMut(&PositionSeekEvent) + Send + 'static,
    {
        self.subscribe(EventFamily::Seek, move |event| {
            if let SyncEvent::Seek(e) = event {
                listener(e);
            }
        })
    }

    /// Returns false when the subscription was already removed
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut inner = lock(&self.inner);
        match subscription.family {
            Some(family) => inner.listeners_mut(family).remove(subscription.id),
            None => inner.any.remove(subscription.id),
        }
    }

    pub fn subscriber_count(&self, family: EventFamily) -> usize {
        lock(&self.inner).listeners(family).len()
    }

    /// Drop every external subscription
    pub fn clear_subscribers(&self) {
        let mut inner = lock(&self.inner);
        inner.lyrics_sync.clear();
        inner.position_update.clear();
        inner.playback_state.clear();
        inner.seek.clear();
        inner.any.clear();
    }
}

impl std::fmt::Debug for SyncEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("SyncEventBus")
            .field("lines", &inner.lines.len())
            .field("cursor", &inner.cursor)
            .field("sync_threshold_secs", &inner.sync_threshold_secs)
            .field("attached", &!self.attachments.is_empty())
            .finish()
    }
}

fn lock(inner: &Mutex<BusInner>) -> MutexGuard<'_, BusInner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

fn sanitize_threshold(threshold_secs: f64) -> f64 {
    if threshold_secs.is_finite() {
        threshold_secs.max(0.0)
    } else {
        0.0
    }
}
