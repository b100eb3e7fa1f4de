/// Streaming speech recognition
///
/// This module provides the [`SpeechRecognitionChannel`] capability and
/// its WebSocket implementation: a JSON handshake frame, binary PCM
/// chunk frames upstream, and JSON recognition messages downstream,
/// pumped by concurrent sender/receiver tasks.

/// Channel capability and WebSocket implementation
pub mod channel;

/// Raw WebSocket connection management
pub mod connection;

/// ASR error types
pub mod error;

/// Wire message type definitions
pub mod messages;

/// Async tasks for concurrent send/receive operations
pub mod tasks;

// Re-export commonly used types
pub use channel::{AsrSession, AsrStreamEvent, SpeechRecognitionChannel, WsAsrChannel};
pub use connection::{AsrConfig, AsrConnection, WsReader, WsWriter};
pub use error::{AsrChannelResult, AsrError};
pub use messages::{AsrHandshake, AsrMessage, AsrResult};
