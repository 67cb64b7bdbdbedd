//! Event types for the nowsync event system
//!
//! Provides the externally visible sync event definitions and the broadcast
//! EventBus used to relay them to asynchronous transports (SSE, sockets).

mod lyrics_types;
mod playback_types;

pub use lyrics_types::{LyricLine, LyricWord};
pub use playback_types::{Accuracy, PlaybackState};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Synchronized events republished by the sync event bus
///
/// Closed set of event families. Serialized with a `type` tag so transports can
/// forward the JSON verbatim to browser clients.
///
/// All timestamps are wall-clock time at emission, not sample time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// Active lyrics line changed
    ///
    /// Triggers:
    /// - UI: Scroll to and highlight the new line
    #[serde(rename = "lyrics.sync")]
    LyricsSync(LyricsSyncEvent),

    /// Position estimate refreshed (every real sample)
    ///
    /// Triggers:
    /// - UI: Update progress bar
    #[serde(rename = "position.update")]
    PositionUpdate(PositionUpdateEvent),

    /// Play/pause transition
    ///
    /// Triggers:
    /// - UI: Update play/pause controls
    /// - UI: Start or stop local position animation
    #[serde(rename = "playback.state")]
    PlaybackState(PlaybackStateEvent),

    /// Discontinuous position change detected
    ///
    /// Triggers:
    /// - UI: Re-sync lyrics immediately instead of animating
    #[serde(rename = "position.seek")]
    Seek(PositionSeekEvent),
}

/// Payload of `lyrics.sync`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricsSyncEvent {
    pub timestamp: DateTime<Utc>,
    /// Lyrics-compensated position (seconds)
    pub position: f64,
    /// Active line, serialized as -1 when no line is active
    #[serde(with = "index_sentinel")]
    pub line_index: Option<usize>,
    /// Active word within the line, serialized as -1 when none
    #[serde(with = "index_sentinel")]
    pub word_index: Option<usize>,
}

/// Payload of `position.update`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdateEvent {
    pub timestamp: DateTime<Utc>,
    /// Uncompensated interpolated position (seconds)
    pub position: f64,
    pub is_playing: bool,
    pub accuracy: Accuracy,
}

/// Payload of `playback.state`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStateEvent {
    pub timestamp: DateTime<Utc>,
    pub state: PlaybackState,
    pub position: f64,
}

/// Payload of `position.seek`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSeekEvent {
    pub timestamp: DateTime<Utc>,
    pub from_position: f64,
    pub to_position: f64,
}

/// Event family, used for per-family subscription and SSE event names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFamily {
    LyricsSync,
    PositionUpdate,
    PlaybackState,
    Seek,
}

impl EventFamily {
    /// Wire name of the family
    pub fn as_str(&self) -> &'static str {
        match self {
            EventFamily::LyricsSync => "lyrics.sync",
            EventFamily::PositionUpdate => "position.update",
            EventFamily::PlaybackState => "playback.state",
            EventFamily::Seek => "position.seek",
        }
    }
}

impl std::fmt::Display for EventFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SyncEvent {
    pub fn family(&self) -> EventFamily {
        match self {
            SyncEvent::LyricsSync(_) => EventFamily::LyricsSync,
            SyncEvent::PositionUpdate(_) => EventFamily::PositionUpdate,
            SyncEvent::PlaybackState(_) => EventFamily::PlaybackState,
            SyncEvent::Seek(_) => EventFamily::Seek,
        }
    }

    /// Get event type as string for filtering
    pub fn event_type(&self) -> &'static str {
        self.family().as_str()
    }

    /// Emission timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SyncEvent::LyricsSync(e) => e.timestamp,
            SyncEvent::PositionUpdate(e) => e.timestamp,
            SyncEvent::PlaybackState(e) => e.timestamp,
            SyncEvent::Seek(e) => e.timestamp,
        }
    }
}

/// Serializes `Option<usize>` as a plain integer with -1 standing for `None`
mod index_sentinel {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<usize>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(index) => serializer.serialize_i64(*index as i64),
            None => serializer.serialize_i64(-1),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = i64::deserialize(deserializer)?;
        Ok(usize::try_from(raw).ok())
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Broadcast relay for sync events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the sync engine)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use nowsync_common::events::{EventBus, PlaybackState, PlaybackStateEvent, SyncEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(SyncEvent::PlaybackState(PlaybackStateEvent {
///     timestamp: chrono::Utc::now(),
///     state: PlaybackState::Playing,
///     position: 12.5,
/// }));
///
/// let received = rx.try_recv().unwrap();
/// assert_eq!(received.event_type(), "playback.state");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before lagging receivers lose old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: SyncEvent) -> Result<usize, broadcast::error::SendError<SyncEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
