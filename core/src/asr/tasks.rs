/// Async tasks for streaming audio to and results from the ASR server
///
/// The channel implementation spawns one of each per connection; they
/// run until the audio channel closes or the server disconnects.
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::channel::AsrStreamEvent;
use super::connection::{WsReader, WsWriter};
use super::error::{AsrChannelResult, AsrError};
use super::messages::{AsrMessage, AsrResult};

/// Forwards binary PCM chunks from a channel to the WebSocket
///
/// Runs until the audio channel closes, then sends a close frame.
pub async fn sender_task(
    mut ws_writer: WsWriter,
    mut audio_rx: mpsc::Receiver<Vec<u8>>,
) -> AsrChannelResult<()> {
    info!("ASR sender task started");

    let mut chunk_count = 0u64;

    while let Some(chunk) = audio_rx.recv().await {
        chunk_count += 1;
        debug!(
            "Sending audio chunk #{} ({} bytes)",
            chunk_count,
            chunk.len()
        );

        ws_writer
            .send(Message::Binary(chunk.into()))
            .await
            .map_err(AsrError::WebSocketError)?;
    }

    info!(
        "ASR sender task completed: {} chunks sent, channel closed",
        chunk_count
    );

    if let Err(e) = ws_writer.close().await {
        warn!("Failed to close ASR writer: {}", e);
    }

    Ok(())
}

/// Reads recognition messages from the WebSocket and forwards them
///
/// Malformed messages are logged and dropped; they must not take down
/// the streaming loop. A close frame or stream error surfaces as an
/// [`AsrStreamEvent::Disconnected`] notice.
pub async fn receiver_task(
    mut ws_reader: WsReader,
    events_tx: mpsc::Sender<AsrStreamEvent>,
) -> AsrChannelResult<()> {
    info!("ASR receiver task started");

    let mut result_count = 0u64;

    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<AsrMessage>(&text) {
                    Ok(message) => {
                        result_count += 1;
                        let result = AsrResult::from(message);

                        if events_tx
                            .send(AsrStreamEvent::Result(result))
                            .await
                            .is_err()
                        {
                            warn!("ASR event receiver dropped, stopping");
                            return Ok(());
                        }
                    }
                    Err(e) => {
                        // Malformed server frame; keep the stream alive
                        warn!("Dropping malformed ASR message: {}", e);
                    }
                }
            }
            Ok(Message::Close(frame)) => {
                info!("ASR server sent close frame: {:?}", frame);
                let _ = events_tx
                    .send(AsrStreamEvent::Disconnected {
                        reason: "server closed the connection".to_string(),
                    })
                    .await;
                break;
            }
            Ok(Message::Ping(data)) => {
                debug!("Received ping ({} bytes)", data.len());
            }
            Ok(Message::Pong(_)) => {
                debug!("Received pong");
            }
            Ok(other) => {
                warn!("Unexpected ASR message type: {:?}", other);
            }
            Err(e) => {
                error!("ASR WebSocket error: {}", e);
                let _ = events_tx
                    .send(AsrStreamEvent::Disconnected {
                        reason: e.to_string(),
                    })
                    .await;
                return Err(AsrError::WebSocketError(e));
            }
        }
    }

    info!(
        "ASR receiver task completed: {} results received",
        result_count
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_channel_behavior() {
        let (tx, mut rx) = mpsc::channel::<AsrStreamEvent>(10);

        let result = AsrResult {
            text: "测试".to_string(),
            confidence: 0.9,
            is_final: true,
            timestamp_ms: 1,
        };

        tx.send(AsrStreamEvent::Result(result.clone()))
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            AsrStreamEvent::Result(received) => assert_eq!(received, result),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_message_parse_for_receiver_path() {
        let json = r#"{"mode":"offline","text":"你好","confidence":0.7,"is_final":false}"#;
        let message: AsrMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.text, "你好");
        assert!(!message.is_final);
    }

    #[test]
    fn test_malformed_message_is_an_error_not_a_panic() {
        let result = serde_json::from_str::<AsrMessage>("not json at all");
        assert!(result.is_err());
    }
}
