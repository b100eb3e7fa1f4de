/// The speech-recognition channel capability and its WebSocket implementation
use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::connection::{AsrConfig, AsrConnection};
use super::error::AsrChannelResult;
use super::messages::AsrResult;
use super::tasks::{receiver_task, sender_task};

/// Events delivered by an open recognition stream
#[derive(Debug, Clone, PartialEq)]
pub enum AsrStreamEvent {
    /// A recognition result (partial or final)
    Result(AsrResult),

    /// The server disconnected; no further results will arrive
    Disconnected { reason: String },
}

/// Handles for one open recognition stream
///
/// Audio chunks go in through `audio_tx`; recognition events come out of
/// `events_rx`. Dropping `audio_tx` closes the stream gracefully.
pub struct AsrSession {
    /// Sender for binary PCM chunks
    pub audio_tx: mpsc::Sender<Vec<u8>>,
    /// Receiver for recognition events
    pub events_rx: mpsc::Receiver<AsrStreamEvent>,
}

impl AsrSession {
    /// Whether the stream can still accept audio
    pub fn is_open(&self) -> bool {
        !self.audio_tx.is_closed()
    }
}

/// Capability for opening a streaming recognition session
///
/// The embedding application may substitute any transport; the
/// orchestrator only sees the channel handles.
pub trait SpeechRecognitionChannel: Send {
    /// Connect, perform the handshake and return the stream handles
    fn open(&mut self) -> Pin<Box<dyn Future<Output = AsrChannelResult<AsrSession>> + Send + '_>>;
}

/// WebSocket-backed recognition channel
///
/// Opening a session connects to the configured server, sends the JSON
/// handshake and spawns the sender/receiver tasks. The previous
/// session's tasks are aborted when a new one is opened.
pub struct WsAsrChannel {
    config: AsrConfig,
    tasks: Vec<JoinHandle<()>>,
}

impl WsAsrChannel {
    /// Create a channel for the given configuration
    pub fn new(config: AsrConfig) -> Self {
        Self {
            config,
            tasks: Vec::new(),
        }
    }

    /// The channel configuration
    pub fn config(&self) -> &AsrConfig {
        &self.config
    }

    /// Replace the configuration
    ///
    /// Takes effect at the next [`SpeechRecognitionChannel::open`] call.
    pub fn update_config(&mut self, config: AsrConfig) {
        self.config = config;
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl SpeechRecognitionChannel for WsAsrChannel {
    fn open(&mut self) -> Pin<Box<dyn Future<Output = AsrChannelResult<AsrSession>> + Send + '_>> {
        Box::pin(async move {
            // A reopen supersedes the previous stream
            self.abort_tasks();

            let connection = AsrConnection::connect(&self.config).await?;
            let (writer, reader) = connection.split();

            let (audio_tx, audio_rx) = mpsc::channel::<Vec<u8>>(100);
            let (events_tx, events_rx) = mpsc::channel::<AsrStreamEvent>(100);

            let sender = tokio::spawn(async move {
                if let Err(e) = sender_task(writer, audio_rx).await {
                    debug!("ASR sender task ended with error: {}", e);
                }
            });

            let receiver = tokio::spawn(async move {
                if let Err(e) = receiver_task(reader, events_tx).await {
                    debug!("ASR receiver task ended with error: {}", e);
                }
            });

            self.tasks.push(sender);
            self.tasks.push(receiver);

            info!("ASR stream opened to {}", self.config.server_url);

            Ok(AsrSession {
                audio_tx,
                events_rx,
            })
        })
    }
}

impl Drop for WsAsrChannel {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_creation() {
        let channel = WsAsrChannel::new(AsrConfig::default());
        assert_eq!(channel.config().sample_rate, 16000);
        assert!(channel.tasks.is_empty());
    }

    #[test]
    fn test_update_config() {
        let mut channel = WsAsrChannel::new(AsrConfig::default());
        channel.update_config(AsrConfig::new("ws://other:10095"));
        assert_eq!(channel.config().server_url, "ws://other:10095");
    }

    #[tokio::test]
    async fn test_open_against_unreachable_server_fails() {
        let mut channel =
            WsAsrChannel::new(AsrConfig::new("ws://127.0.0.1:1").with_timeout(500));
        assert!(channel.open().await.is_err());
    }

    #[tokio::test]
    async fn test_session_open_state_tracks_receiver() {
        let (audio_tx, audio_rx) = mpsc::channel(10);
        let (_events_tx, events_rx) = mpsc::channel(10);

        let session = AsrSession {
            audio_tx,
            events_rx,
        };
        assert!(session.is_open());

        drop(audio_rx);
        assert!(!session.is_open());
    }
}
