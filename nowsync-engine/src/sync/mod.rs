//! Synchronized event dispatch
//!
//! Derives discrete UI-facing events from the position stream and fans them out.

pub mod bus;
pub mod listeners;
pub mod lyrics;

pub use bus::{Subscription, SyncEventBus};
pub use listeners::{ListenerId, Listeners};
pub use lyrics::{resolve_line, resolve_word, LyricsCursor, LyricsMatch};
