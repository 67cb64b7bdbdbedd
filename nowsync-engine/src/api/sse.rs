//! Server-Sent Events (SSE) stream
//!
//! Streams synchronized events to connected clients. The SSE event name is the
//! event type (`lyrics.sync`, `position.update`, ...), the data is the JSON event.
//! Streams end when the server shuts down.

use crate::api::server::AppContext;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use nowsync_common::events::SyncEvent;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

/// GET /events - SSE event stream
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("New SSE client connected");

    let rx = ctx.service.subscribe_events();
    let shutdown = ctx.shutdown.clone();

    let stream = BroadcastStream::new(rx)
        .filter_map(|result| async move {
            match result {
                Ok(event) => to_sse_event(&event).map(Ok),
                Err(e) => {
                    // Lagged receivers lose the oldest events and keep streaming
                    warn!("SSE stream error: {:?}", e);
                    None
                }
            }
        })
        .take_until(async move { shutdown.cancelled().await });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_sse_event(event: &SyncEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(e) => {
            warn!("Failed to serialize {} event: {}", event.event_type(), e);
            None
        }
    }
}
