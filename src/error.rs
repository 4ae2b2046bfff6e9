//! Error types for Beacon Live

use thiserror::Error;

/// Result type alias for Beacon Live operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Beacon Live
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error (output context, stream setup)
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone unavailable or access refused
    #[error("microphone error: {0}")]
    Microphone(String),

    /// PCM/base64 payload could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(String),

    /// Session transport error (connect, send, protocol)
    #[error("transport error: {0}")]
    Transport(String),

    /// Transport did not open within the configured timeout
    #[error("transport connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WebSocket error
    #[error("websocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    /// URL parsing error
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Self::Codec(err.to_string())
    }
}
