//! Integration tests for the nowsync HTTP API
//!
//! Tests the complete API surface including:
//! - Health checks
//! - Pushed samples and position snapshots
//! - Track changes and lyrics cursor
//! - Compensation clamping
//! - SSE relay subscription and shutdown
//! - JSON error bodies for rejected requests

use axum::body::Body;
use axum::http::StatusCode;
use http::{Method, Request};
use nowsync_common::config::SyncConfig;
use nowsync_common::events::EventFamily;
use nowsync_common::time::ManualClock;
use nowsync_engine::api::{create_router, AppContext};
use nowsync_engine::SyncService;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn setup_test_server() -> (axum::Router, SyncService) {
    let (router, service, _) = setup_test_server_with_shutdown();
    (router, service)
}

fn setup_test_server_with_shutdown() -> (axum::Router, SyncService, CancellationToken) {
    let service = SyncService::new(&SyncConfig::default(), Arc::new(ManualClock::default()));
    let shutdown = CancellationToken::new();
    let router = create_router(AppContext {
        service: service.clone(),
        port: 5790,
        shutdown: shutdown.clone(),
    });
    (router, service, shutdown)
}

/// Helper function to make HTTP requests to the test server
async fn make_request(
    app: &axum::Router,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Option<Value>) {
    let mut request = Request::builder().method(method).uri(path);
    if body.is_some() {
        request = request.header("content-type", "application/json");
    }

    let request = match body {
        Some(json_body) => request.body(Body::from(json_body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json_body = if bytes.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&bytes).unwrap())
    };

    (status, json_body)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = setup_test_server();

    let (status, body) = make_request(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.expect("Expected response body");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "nowsync-engine");
    assert_eq!(body["port"], 5790);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_push_and_read_position() {
    let (app, _) = setup_test_server();

    let (status, _) = make_request(&app, Method::POST, "/track", Some(json!({"length": 200.0}))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/position",
        Some(json!({"position": 42.0, "isPlaying": true})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_none());

    let (status, body) = make_request(&app, Method::GET, "/position", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.expect("position body");
    assert_eq!(body["actualPosition"], 42.0);
    assert_eq!(body["interpolatedPosition"], 42.0);
    assert_eq!(body["isPlaying"], true);
    assert_eq!(body["confidence"], "high");

    let (status, body) = make_request(&app, Method::GET, "/position/lyrics", None).await;
    assert_eq!(status, StatusCode::OK);
    let lyrics = body.expect("lyrics body")["interpolatedPosition"]
        .as_f64()
        .expect("number");
    assert!((lyrics - 42.2).abs() < 1e-9);
}

#[tokio::test]
async fn test_push_position_with_timestamp() {
    let (app, service) = setup_test_server();
    service.set_track_info(100.0, Vec::new()).expect("valid track");

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/position",
        Some(json!({"position": 7.0, "isPlaying": false, "timestamp": "2025-06-01T12:00:00Z"})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let state = service.with_engine(|engine| engine.manager().state().clone());
    assert_eq!(state.actual_position, 7.0);
    assert_eq!(state.timestamp.to_rfc3339(), "2025-06-01T12:00:00+00:00");
}

#[tokio::test]
async fn test_track_with_invalid_length_is_rejected() {
    let (app, _) = setup_test_server();

    let (status, body) = make_request(&app, Method::POST, "/track", Some(json!({"length": -5.0}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.expect("error body")["error"].is_string());
}

#[tokio::test]
async fn test_mistyped_body_is_bad_request_with_json_error() {
    let (app, _) = setup_test_server();

    let (status, body) = make_request(&app, Method::POST, "/position", Some(json!({"position": "soon"}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.expect("error body")["error"].is_string());
}

#[tokio::test]
async fn test_unparseable_body_is_bad_request_with_json_error() {
    let (app, _) = setup_test_server();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/compensation")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).expect("JSON error body");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_track_lyrics_and_cursor() {
    let (app, _) = setup_test_server();

    let (status, body) = make_request(&app, Method::GET, "/lyrics/cursor", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.expect("cursor"), json!({"lineIndex": -1, "wordIndex": -1}));

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/track",
        Some(json!({
            "length": 120.0,
            "lines": [
                {"time": 0.0, "text": "first"},
                {"text": "(break)"},
                {"time": 10.0, "text": "second", "words": [
                    {"start": 10.0, "text": "sec"},
                    {"start": 10.4, "text": "ond"}
                ]}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    make_request(
        &app,
        Method::POST,
        "/position",
        Some(json!({"position": 10.3, "isPlaying": true})),
    )
    .await;

    let (_, body) = make_request(&app, Method::GET, "/lyrics/cursor", None).await;
    // 10.3 + 0.2 compensation
    assert_eq!(body.expect("cursor"), json!({"lineIndex": 2, "wordIndex": 1}));
}

#[tokio::test]
async fn test_compensation_is_clamped() {
    let (app, service) = setup_test_server();

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/compensation",
        Some(json!({"compensationMs": 3500.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.expect("body")["compensationMs"], 2000.0);

    let (_, body) = make_request(
        &app,
        Method::POST,
        "/compensation",
        Some(json!({"compensationMs": 150.0})),
    )
    .await;
    assert_eq!(body.expect("body")["compensationMs"], 150.0);
    assert_eq!(service.with_engine(|e| e.manager().compensation_ms()), 150.0);
}

#[tokio::test]
async fn test_pushed_samples_reach_event_relay() {
    let (app, service) = setup_test_server();
    let mut rx = service.subscribe_events();

    make_request(&app, Method::POST, "/track", Some(json!({"length": 60.0}))).await;
    make_request(
        &app,
        Method::POST,
        "/position",
        Some(json!({"position": 1.0, "isPlaying": true})),
    )
    .await;

    let families: Vec<EventFamily> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|event| event.family())
        .collect();
    assert_eq!(
        families,
        vec![EventFamily::PlaybackState, EventFamily::PositionUpdate]
    );
}

#[tokio::test]
async fn test_events_endpoint_is_event_stream() {
    let (app, _) = setup_test_server();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/events")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
}

#[tokio::test]
async fn test_events_stream_ends_on_shutdown() {
    let (app, _, shutdown) = setup_test_server_with_shutdown();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/events")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    shutdown.cancel();

    let body = tokio::time::timeout(
        Duration::from_secs(2),
        axum::body::to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .expect("stream should end after shutdown");
    assert!(body.is_ok());
}
