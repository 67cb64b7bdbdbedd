//! # nowsync engine
//!
//! Position tracking and synchronized event dispatch for now-playing and lyrics
//! displays.
//!
//! **Purpose:** Turn sparse, imprecise "position at time T" samples from media
//! backends into a smooth, confidence-rated timeline, detect seeks, and drive
//! lyrics line changes, position ticks and play/pause events for any number of
//! UI surfaces.
//!
//! **Architecture:** [`PositionManager`] owns the state and notifies a
//! [`SyncEventBus`]; [`SyncEngine`] composes the two; [`SyncService`] adds the
//! poll loop and a broadcast relay consumed by the HTTP/SSE bridge in [`api`].

pub mod api;
pub mod engine;
pub mod position;
pub mod service;
pub mod source;
pub mod sync;

pub use engine::SyncEngine;
pub use nowsync_common::{Error, Result};
pub use position::{PositionManager, PositionState};
pub use service::SyncService;
pub use sync::SyncEventBus;
