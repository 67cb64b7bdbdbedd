//! Common error types for nowsync

use thiserror::Error;

/// Common result type for nowsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the nowsync crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Position sample source failed to produce a sample
    #[error("Position source error: {0}")]
    Source(String),

    /// HTTP server or client error
    #[error("HTTP error: {0}")]
    Http(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
