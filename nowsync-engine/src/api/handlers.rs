//! HTTP request handlers
//!
//! Snapshots, pushed samples and track control for the sync engine.

use crate::api::server::AppContext;
use crate::position::PositionState;
use axum::{
    async_trait,
    extract::{FromRequest, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use nowsync_common::events::LyricLine;
use nowsync_common::Error;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    port: u16,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRequest {
    pub position: f64,
    pub is_playing: bool,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    pub length: f64,
    #[serde(default)]
    pub lines: Vec<LyricLine>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationBody {
    pub compensation_ms: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricsCursorResponse {
    /// -1 when no line is active
    line_index: i64,
    /// -1 when no word is active
    word_index: i64,
}

/// Engine errors rendered as JSON
///
/// `InvalidInput` maps to 400, everything else to 500.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// JSON body extractor that rejects through [`ApiError`]
///
/// Malformed or mistyped bodies become a 400 with an `ErrorResponse` body
/// instead of axum's plain-text rejection.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => {
                debug!("Rejected request body: {}", rejection.body_text());
                Err(ApiError(Error::InvalidInput(rejection.body_text())))
            }
        }
    }
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "nowsync-engine".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        port: ctx.port,
    })
}

// ============================================================================
// Position Endpoints
// ============================================================================

/// GET /position - Uncompensated position snapshot
pub async fn get_position(State(ctx): State<AppContext>) -> Json<PositionState> {
    Json(ctx.service.position())
}

/// GET /position/lyrics - Compensated position snapshot
pub async fn get_lyrics_position(State(ctx): State<AppContext>) -> Json<PositionState> {
    Json(ctx.service.lyrics_position())
}

/// POST /position - Push an authoritative sample
pub async fn push_position(
    State(ctx): State<AppContext>,
    ApiJson(req): ApiJson<PositionRequest>,
) -> StatusCode {
    debug!(
        "Pushed sample: position {:.3}, playing {}",
        req.position, req.is_playing
    );
    ctx.service
        .update_position(req.position, req.is_playing, req.timestamp);
    StatusCode::NO_CONTENT
}

// ============================================================================
// Track and Lyrics Endpoints
// ============================================================================

/// POST /track - Track change with optional lyrics line table
pub async fn set_track(
    State(ctx): State<AppContext>,
    ApiJson(req): ApiJson<TrackRequest>,
) -> Result<StatusCode, ApiError> {
    ctx.service.set_track_info(req.length, req.lines)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /compensation - Set lyrics compensation, returns the clamped value
pub async fn set_compensation(
    State(ctx): State<AppContext>,
    ApiJson(req): ApiJson<CompensationBody>,
) -> Json<CompensationBody> {
    let compensation_ms = ctx.service.set_compensation(req.compensation_ms);
    Json(CompensationBody { compensation_ms })
}

/// GET /lyrics/cursor - Active line and word
pub async fn get_lyrics_cursor(State(ctx): State<AppContext>) -> Json<LyricsCursorResponse> {
    let (line, word) = ctx.service.lyrics_cursor();
    Json(LyricsCursorResponse {
        line_index: index_or_none(line),
        word_index: index_or_none(word),
    })
}

fn index_or_none(index: Option<usize>) -> i64 {
    index.map(|i| i as i64).unwrap_or(-1)
}
