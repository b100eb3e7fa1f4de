/// Wire message types for the streaming recognition server
///
/// The client sends one JSON handshake frame after connecting, then raw
/// binary PCM frames. The server answers with JSON recognition messages.
use serde::{Deserialize, Serialize};

use crate::session::context::now_ms;

/// Handshake frame sent once after the WebSocket is established
///
/// # Example
/// ```
/// use vivaflow_lib::asr::messages::AsrHandshake;
///
/// let handshake = AsrHandshake::new(16000).with_hotwords("Rust 并发");
/// let json = serde_json::to_string(&handshake).unwrap();
/// assert!(json.contains("offline"));
/// ```
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AsrHandshake {
    /// Recognition mode (always "offline")
    pub mode: &'static str,

    /// Streaming chunk layout expected by the server
    pub chunk_size: [u32; 3],

    /// Chunk interval in frames
    pub chunk_interval: u32,

    /// Logical stream name
    pub wav_name: &'static str,

    /// Audio sample rate in Hz
    pub audio_fs: u32,

    /// Hotword list for biased recognition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hotwords: Option<String>,

    /// Language code (e.g. "zh", "en")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl AsrHandshake {
    /// Create a handshake frame for the given sample rate
    pub fn new(sample_rate: u32) -> Self {
        Self {
            mode: "offline",
            chunk_size: [5, 10, 5],
            chunk_interval: 10,
            wav_name: "microphone",
            audio_fs: sample_rate,
            hotwords: None,
            language: None,
        }
    }

    /// Set the hotword list
    pub fn with_hotwords(mut self, hotwords: impl Into<String>) -> Self {
        self.hotwords = Some(hotwords.into());
        self
    }

    /// Set the language code
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Recognition message received from the server
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AsrMessage {
    /// Recognition mode echoed by the server
    #[serde(default)]
    pub mode: Option<String>,

    /// Recognized text
    #[serde(default)]
    pub text: String,

    /// Recognition confidence (0.0 - 1.0)
    #[serde(default)]
    pub confidence: f32,

    /// Whether this is the final result for the utterance
    #[serde(default)]
    pub is_final: bool,
}

/// A recognition result surfaced to the session layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsrResult {
    /// Recognized text
    pub text: String,
    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f32,
    /// Whether this is the final result for the utterance
    pub is_final: bool,
    /// When the result was received (Unix milliseconds)
    pub timestamp_ms: u64,
}

impl From<AsrMessage> for AsrResult {
    fn from(message: AsrMessage) -> Self {
        Self {
            text: message.text,
            confidence: message.confidence,
            is_final: message.is_final,
            timestamp_ms: now_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_serialization() {
        let handshake = AsrHandshake::new(16000);
        let json = serde_json::to_string(&handshake).unwrap();

        assert!(json.contains("\"mode\":\"offline\""));
        assert!(json.contains("\"chunk_size\":[5,10,5]"));
        assert!(json.contains("\"chunk_interval\":10"));
        assert!(json.contains("\"wav_name\":\"microphone\""));
        assert!(json.contains("\"audio_fs\":16000"));
        // Optional fields are omitted when unset
        assert!(!json.contains("hotwords"));
        assert!(!json.contains("language"));
    }

    #[test]
    fn test_handshake_builder() {
        let handshake = AsrHandshake::new(16000)
            .with_hotwords("面试 简历")
            .with_language("zh");

        assert_eq!(handshake.hotwords.as_deref(), Some("面试 简历"));
        assert_eq!(handshake.language.as_deref(), Some("zh"));
    }

    #[test]
    fn test_message_deserialization() {
        let json = r#"{
            "mode": "offline",
            "text": "你好世界",
            "confidence": 0.92,
            "is_final": true
        }"#;

        let message: AsrMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.text, "你好世界");
        assert!((message.confidence - 0.92).abs() < 1e-6);
        assert!(message.is_final);
    }

    #[test]
    fn test_message_deserialization_with_missing_fields() {
        // Partial results may omit fields entirely
        let message: AsrMessage = serde_json::from_str(r#"{"text": "部分"}"#).unwrap();
        assert_eq!(message.text, "部分");
        assert_eq!(message.confidence, 0.0);
        assert!(!message.is_final);
        assert!(message.mode.is_none());
    }

    #[test]
    fn test_result_from_message() {
        let message = AsrMessage {
            mode: Some("offline".to_string()),
            text: "最终结果".to_string(),
            confidence: 0.8,
            is_final: true,
        };

        let result = AsrResult::from(message);
        assert_eq!(result.text, "最终结果");
        assert!(result.is_final);
        assert!(result.timestamp_ms > 0);
    }
}
