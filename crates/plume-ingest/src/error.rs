//! Error types for the monitor daemon.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while monitoring.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Snapshot could not be written. The buffer is kept for the next attempt.
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Decoding error from the core crate.
    #[error(transparent)]
    Core(#[from] plume_core::Error),
}
