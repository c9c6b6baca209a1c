//! Error types shared by the relay, producer and viewer.

use thiserror::Error;

/// Library error type.
#[derive(Error, Debug)]
pub enum ShoutError {
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Inbound frame decoded to JSON that is not an object.
    #[error("Expected a JSON object, got: {0}")]
    NotAnObject(String),

    /// WebSocket transport error (client side).
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// I/O error (child process, terminal).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The relay answered a handshake with something unexpected.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Connection closed before the operation could complete.
    #[error("Connection closed")]
    Closed,
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, ShoutError>;
