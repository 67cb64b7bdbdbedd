//! nowsync engine - Main entry point
//!
//! Runs the sync engine as a service: polls an optional HTTP position source,
//! accepts pushed samples and track changes over HTTP, and streams synchronized
//! events to browser clients over SSE.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use nowsync_common::config::TomlConfig;
use nowsync_common::time::SystemClock;
use nowsync_engine::api::{self, AppContext};
use nowsync_engine::source::HttpPositionSource;
use nowsync_engine::SyncService;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "nowsync_engine=debug,nowsync_common=info,tower_http=info";

/// Command-line arguments for nowsync-engine
#[derive(Parser, Debug)]
#[command(name = "nowsync-engine")]
#[command(about = "Position tracking and lyrics sync service")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "NOWSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "NOWSYNC_PORT")]
    port: Option<u16>,

    /// URL polled for position samples (overrides config)
    #[arg(long, env = "NOWSYNC_SOURCE_URL")]
    source_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Config is loaded before tracing so the [logging] level can seed the filter
    let config = TomlConfig::load_resolved(args.config.as_deref());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config
            .as_ref()
            .ok()
            .and_then(|c| c.logging.level.clone())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        EnvFilter::new(level)
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config.context("Failed to load configuration")?;
    let port = args.port.unwrap_or(config.server.port);
    let source_url = args.source_url.or_else(|| config.source.url.clone());

    info!("Starting nowsync engine on port {}", port);
    info!(
        "Poll interval {:?}, lyrics compensation {}ms",
        config.sync.poll_interval(),
        config.sync.compensation_ms()
    );

    let service = SyncService::new(&config.sync, Arc::new(SystemClock));

    match source_url {
        Some(url) => {
            let source = HttpPositionSource::new(url, config.sync.source_timeout())
                .context("Failed to create position source")?;
            info!("Polling position source at {}", source.url());
            service.initialize(Arc::new(source));
        }
        None => info!("No position source configured, waiting for pushed samples"),
    }

    let ctx = AppContext {
        service: service.clone(),
        port,
        shutdown: CancellationToken::new(),
    };

    api::run(ctx, shutdown_signal())
        .await
        .context("Server error")?;

    service.cleanup();
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
