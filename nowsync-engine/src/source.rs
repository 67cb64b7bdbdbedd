//! Pull-based position sources
//!
//! A source answers "where is playback right now?" and may suspend or fail.
//! The poll loop in [`SyncService`](crate::SyncService) bounds every fetch with
//! a timeout and skips failed ticks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nowsync_common::{Error, Result};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

/// One fetched sample
///
/// `timestamp` is when the position was observed; `None` means "now".
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PositionReport {
    pub position: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl PositionReport {
    pub fn now(position: f64) -> Self {
        Self {
            position,
            timestamp: None,
        }
    }
}

#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn fetch_position(&self) -> Result<PositionReport>;
}

/// Adapts an async closure into a [`PositionSource`]
pub struct FnSource<F>(pub F);

#[async_trait]
impl<F, Fut> PositionSource for FnSource<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<PositionReport>> + Send,
{
    async fn fetch_position(&self) -> Result<PositionReport> {
        (self.0)().await
    }
}

/// Polls an HTTP endpoint returning `{"position": <secs>, "timestamp": <rfc3339>?}`
#[derive(Debug, Clone)]
pub struct HttpPositionSource {
    client: reqwest::Client,
    url: String,
}

impl HttpPositionSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Source(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PositionSource for HttpPositionSource {
    async fn fetch_position(&self) -> Result<PositionReport> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::Source(format!("GET {} failed: {}", self.url, e)))?
            .error_for_status()
            .map_err(|e| Error::Source(format!("GET {} returned error: {}", self.url, e)))?;

        response
            .json::<PositionReport>()
            .await
            .map_err(|e| Error::Source(format!("Invalid position payload from {}: {}", self.url, e)))
    }
}
