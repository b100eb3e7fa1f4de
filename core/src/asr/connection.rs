/// WebSocket connection to the streaming recognition server
///
/// This module provides the raw WebSocket client used by the
/// channel implementation in `asr::channel`.
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use super::error::{AsrChannelResult, AsrError};
use super::messages::AsrHandshake;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the WebSocket stream
pub type WsWriter = SplitSink<WsStream, Message>;

/// Read half of the WebSocket stream
pub type WsReader = SplitStream<WsStream>;

/// Configuration for the recognition channel
///
/// # Example
/// ```no_run
/// use vivaflow_lib::asr::AsrConfig;
///
/// let config = AsrConfig::new("ws://localhost:10095")
///     .with_language("zh")
///     .with_hotwords("分布式 一致性");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsrConfig {
    /// Recognition server URL (ws:// or wss://)
    pub server_url: String,

    /// Language code (e.g. "zh", "en")
    pub language: Option<String>,

    /// Hotword list for biased recognition
    pub hotwords: Option<String>,

    /// Audio sample rate in Hz (typically 16000)
    pub sample_rate: u32,

    /// Connection timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:10095".to_string(),
            language: None,
            hotwords: None,
            sample_rate: 16000,
            timeout_ms: 10000,
        }
    }
}

impl AsrConfig {
    /// Create a configuration for the given server URL
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Default::default()
        }
    }

    /// Set the language code
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set the hotword list
    pub fn with_hotwords(mut self, hotwords: impl Into<String>) -> Self {
        self.hotwords = Some(hotwords.into());
        self
    }

    /// Set the connection timeout in milliseconds
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Build the handshake frame for this configuration
    pub fn handshake(&self) -> AsrHandshake {
        let mut handshake = AsrHandshake::new(self.sample_rate);
        if let Some(ref hotwords) = self.hotwords {
            handshake = handshake.with_hotwords(hotwords.clone());
        }
        if let Some(ref language) = self.language {
            handshake = handshake.with_language(language.clone());
        }
        handshake
    }
}

/// Raw WebSocket connection to the recognition server
#[derive(Debug)]
pub struct AsrConnection {
    ws_stream: WsStream,
}

impl AsrConnection {
    /// Connect to the recognition server and send the handshake frame
    ///
    /// # Errors
    /// Returns [`AsrError::Timeout`] if the connection does not come up
    /// within the configured timeout, or [`AsrError::ConnectionFailed`]
    /// on any other connection problem.
    pub async fn connect(config: &AsrConfig) -> AsrChannelResult<Self> {
        info!("Connecting to ASR server: {}", config.server_url);

        if !config.server_url.starts_with("ws://") && !config.server_url.starts_with("wss://") {
            return Err(AsrError::InvalidConfig(format!(
                "ASR server URL must be ws:// or wss://, got {}",
                config.server_url
            )));
        }

        let timeout = tokio::time::Duration::from_millis(config.timeout_ms);
        let connect_future = connect_async(config.server_url.as_str());

        let (ws_stream, response) = tokio::time::timeout(timeout, connect_future)
            .await
            .map_err(|_| AsrError::Timeout(config.timeout_ms))?
            .map_err(|e| AsrError::ConnectionFailed(e.to_string()))?;

        info!("Connected to ASR server (status: {})", response.status());

        let mut connection = Self { ws_stream };
        connection.send_handshake(config).await?;

        Ok(connection)
    }

    /// Send the JSON handshake frame
    async fn send_handshake(&mut self, config: &AsrConfig) -> AsrChannelResult<()> {
        let json = serde_json::to_string(&config.handshake())?;
        debug!("Sending ASR handshake: {}", json);

        self.ws_stream
            .send(Message::Text(json.into()))
            .await
            .map_err(AsrError::WebSocketError)?;

        Ok(())
    }

    /// Split the connection into separate read and write halves
    ///
    /// The halves are used by the sender/receiver tasks for concurrent
    /// send and receive operations.
    pub fn split(self) -> (WsWriter, WsReader) {
        self.ws_stream.split()
    }
}
