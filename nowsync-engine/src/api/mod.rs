//! HTTP/SSE bridge
//!
//! Relays engine events to browser clients and accepts pushed samples, track
//! changes and compensation updates.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{create_router, run, AppContext};
