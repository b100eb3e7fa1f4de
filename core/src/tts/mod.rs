/// Speech synthesis capabilities
///
/// Synthesis itself is supplied by the embedding application; the core
/// only defines the capability contracts and the playback strategy
/// selection. Two strategies exist:
///
/// - **Direct**: the synthesizer plays the audio itself and the call
///   resolves when playback finishes ([`SpeechSynthesizer::speak`])
/// - **Buffered**: the synthesizer returns raw audio bytes which are
///   played through an [`AudioSink`] ([`SpeechSynthesizer::synthesize`])
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Playback strategy for spoken output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStrategy {
    /// Synthesizer plays audio itself, call resolves when done
    Direct,
    /// Synthesizer returns audio bytes, played through an `AudioSink`
    Buffered,
}

/// Voice parameters passed to the synthesizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceParams {
    /// Voice model name (None lets the synthesizer pick)
    pub voice: Option<String>,
    /// Speech rate multiplier
    pub speed: f32,
    /// Output volume (0.0 - 1.0)
    pub volume: f32,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            voice: None,
            speed: 1.0,
            volume: 1.0,
        }
    }
}

/// Speech synthesis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Language tag (e.g. "zh-CN", "en-US")
    pub language: String,
    /// Playback strategy
    pub strategy: PlaybackStrategy,
    /// Voice parameters
    pub voice: VoiceParams,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            language: "zh-CN".to_string(),
            strategy: PlaybackStrategy::Direct,
            voice: VoiceParams::default(),
        }
    }
}

impl TtsConfig {
    /// Resolve the voice parameters, filling the voice model from the
    /// language when none is set explicitly
    pub fn resolved_voice(&self) -> VoiceParams {
        let mut params = self.voice.clone();
        if params.voice.is_none() {
            params.voice = voice_for_language(&self.language).map(str::to_string);
        }
        params
    }
}

/// Default voice model for a language tag
pub fn voice_for_language(language: &str) -> Option<&'static str> {
    match language {
        "zh-CN" => Some("zh-CN-female-huayan"),
        "en-US" => Some("en-US-female-amy"),
        _ => None,
    }
}

/// Rough duration estimate for spoken text
///
/// Roughly 3 Chinese characters or 5 English words per second; used for
/// progress display when the synthesizer reports no duration.
pub fn estimate_speech_duration(text: &str) -> Duration {
    let has_cjk = text
        .chars()
        .any(|c| ('\u{4e00}'..='\u{9fa5}').contains(&c));

    let seconds = if has_cjk {
        text.chars().count() as f64 / 3.0
    } else {
        text.split_whitespace().count() as f64 / 5.0
    };

    Duration::from_millis((seconds * 1000.0) as u64)
}

/// Capability for synthesizing (and optionally playing) speech
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize and play `text`, resolving when playback completes
    fn speak(
        &self,
        text: &str,
        params: &VoiceParams,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Synthesize `text` to raw audio bytes without playing it
    fn synthesize(
        &self,
        text: &str,
        params: &VoiceParams,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<u8>>> + Send + '_>>;

    /// Probe whether the synthesis service is reachable
    fn is_available(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
}

/// Capability for playing a synthesized audio buffer
pub trait AudioSink: Send + Sync {
    /// Play the buffer to completion
    fn play(&self, audio: Vec<u8>) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Interrupt any in-progress playback
    fn stop(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TtsConfig::default();
        assert_eq!(config.language, "zh-CN");
        assert_eq!(config.strategy, PlaybackStrategy::Direct);
        assert_eq!(config.voice.speed, 1.0);
        assert_eq!(config.voice.volume, 1.0);
    }

    #[test]
    fn test_voice_for_language() {
        assert_eq!(voice_for_language("zh-CN"), Some("zh-CN-female-huayan"));
        assert_eq!(voice_for_language("en-US"), Some("en-US-female-amy"));
        assert_eq!(voice_for_language("fr-FR"), None);
    }

    #[test]
    fn test_resolved_voice_fills_from_language() {
        let config = TtsConfig::default();
        let params = config.resolved_voice();
        assert_eq!(params.voice.as_deref(), Some("zh-CN-female-huayan"));

        let explicit = TtsConfig {
            voice: VoiceParams {
                voice: Some("custom".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(explicit.resolved_voice().voice.as_deref(), Some("custom"));
    }

    #[test]
    fn test_estimate_chinese_duration() {
        // 9 chars at ~3 chars/second
        let duration = estimate_speech_duration("请介绍一下你自己吧");
        assert_eq!(duration, Duration::from_millis(3000));
    }

    #[test]
    fn test_estimate_english_duration() {
        // 10 words at ~5 words/second
        let duration =
            estimate_speech_duration("please tell me a little bit about yourself right now");
        assert_eq!(duration, Duration::from_millis(2000));
    }

    #[test]
    fn test_config_serialization() {
        let config = TtsConfig {
            strategy: PlaybackStrategy::Buffered,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"buffered\""));

        let deserialized: TtsConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }
}
