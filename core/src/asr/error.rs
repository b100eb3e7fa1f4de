/// Error types for the speech-recognition channel
///
/// This module defines error types used throughout the ASR layer.
use thiserror::Error;

/// ASR channel errors
#[derive(Error, Debug)]
pub enum AsrError {
    /// Failed to connect to the recognition server
    #[error("Failed to connect to ASR server: {0}")]
    ConnectionFailed(String),

    /// Connection timeout
    #[error("ASR connection timeout after {0}ms")]
    Timeout(u64),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    /// Failed to serialize or deserialize a message
    #[error("Failed to serialize message: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Failed to build the HTTP upgrade request
    #[error("Failed to build HTTP request: {0}")]
    HttpError(String),

    /// Connection closed unexpectedly
    #[error("ASR connection closed unexpectedly")]
    ConnectionClosed,

    /// Invalid configuration
    #[error("Invalid ASR configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for ASR operations
pub type AsrChannelResult<T> = Result<T, AsrError>;
