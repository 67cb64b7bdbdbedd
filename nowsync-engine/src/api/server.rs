//! HTTP server setup and routing
//!
//! Sets up the Axum router for position control endpoints and the SSE stream.

use crate::service::SyncService;
use axum::{
    routing::{get, post},
    Router,
};
use nowsync_common::{Error, Result};
use std::future::Future;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub service: SyncService,
    /// Port the server listens on (reported by `/health`)
    pub port: u16,
    /// Cancelled when the server begins shutting down; ends open SSE streams
    pub shutdown: CancellationToken,
}

/// Build the router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(super::handlers::health))
        // Position snapshots and pushed samples
        .route(
            "/position",
            get(super::handlers::get_position).post(super::handlers::push_position),
        )
        .route("/position/lyrics", get(super::handlers::get_lyrics_position))
        // Track and lyrics control
        .route("/track", post(super::handlers::set_track))
        .route("/compensation", post(super::handlers::set_compensation))
        .route("/lyrics/cursor", get(super::handlers::get_lyrics_cursor))
        // SSE event stream
        .route("/events", get(super::sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Enable CORS for browser overlays on other origins
        .layer(CorsLayer::permissive())
}

/// Run the HTTP API server until `shutdown` resolves
///
/// Cancels `ctx.shutdown` once the signal fires so SSE clients are released
/// and graceful shutdown does not wait on them.
pub async fn run(ctx: AppContext, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], ctx.port));
    let token = ctx.shutdown.clone();
    let app = create_router(ctx);

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            token.cancel();
        })
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
