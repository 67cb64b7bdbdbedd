//! # nowsync Common Library
//!
//! Shared code for the nowsync workspace:
//! - Event types (SyncEvent enum) and the broadcast EventBus
//! - Lyrics line/word types consumed by the sync engine
//! - Configuration loading
//! - Clock abstraction and time helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
