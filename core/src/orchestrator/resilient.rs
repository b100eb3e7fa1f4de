/// Resilient wrapper around the audio orchestrator
///
/// Composition, not inheritance: [`ResilientAudioOrchestrator`] wraps a
/// plain [`AudioOrchestrator`] and adds error classification, bounded
/// initialization retries and a text fallback mode. Fallback mode is
/// the primary mechanism for keeping an interview session alive when
/// voice I/O is broken: `speak` degrades to echoing the text
/// immediately and `start_recording` signals the caller to collect a
/// typed answer instead.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::audio::AudioError;
use crate::recovery::{ErrorClassifier, ErrorKind};
use crate::retry::{RetryConfig, RetryManager, RetryOptions};
use crate::turn::TurnCoordinator;

use super::error::{OrchestratorError, OrchestratorResult};
use super::manager::{AudioOrchestrator, OrchestratorEvent};

/// Options governing the resilience layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceOptions {
    /// Retry transient initialization failures automatically
    pub enable_auto_retry: bool,
    /// Maximum initialization attempts
    pub max_retry_attempts: u32,
    /// Delay between initialization attempts in milliseconds
    pub retry_delay_ms: u64,
    /// Degrade to text interaction instead of failing outright
    pub enable_fallback_mode: bool,
}

impl Default for ResilienceOptions {
    fn default() -> Self {
        Self {
            enable_auto_retry: true,
            max_retry_attempts: 3,
            retry_delay_ms: 2000,
            enable_fallback_mode: true,
        }
    }
}

/// Orchestrator wrapper that classifies failures and degrades gracefully
pub struct ResilientAudioOrchestrator {
    inner: Arc<AudioOrchestrator>,
    classifier: Arc<ErrorClassifier>,
    retry_manager: RetryManager,
    options: ResilienceOptions,
    fallback_mode: AtomicBool,
}

impl ResilientAudioOrchestrator {
    /// Wrap an orchestrator with the resilience layer
    pub fn new(
        inner: Arc<AudioOrchestrator>,
        classifier: Arc<ErrorClassifier>,
        retry_manager: RetryManager,
        options: ResilienceOptions,
    ) -> Self {
        Self {
            inner,
            classifier,
            retry_manager,
            options,
            fallback_mode: AtomicBool::new(false),
        }
    }

    /// The wrapped orchestrator
    pub fn inner(&self) -> &Arc<AudioOrchestrator> {
        &self.inner
    }

    /// Subscribe to orchestrator events (including fallback events)
    pub fn subscribe(&self) -> mpsc::Receiver<OrchestratorEvent> {
        self.inner.subscribe()
    }

    /// The turn coordinator driving the wrapped orchestrator
    pub fn turn(&self) -> Arc<TurnCoordinator> {
        self.inner.turn()
    }

    /// Initialize with bounded retries and fallback degradation
    ///
    /// Transient failures (ASR/network) are retried up to
    /// `max_retry_attempts`. If initialization still fails and fallback
    /// mode is enabled, the session continues in text mode and the call
    /// returns Ok.
    pub async fn initialize(&self) -> OrchestratorResult<()> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.inner.initialize().await {
                Ok(()) => return Ok(()),
                Err(error) => {
                    let kind = Self::kind_for(&error);
                    self.classifier.classify_as(
                        kind,
                        kind.default_severity(),
                        error.to_string(),
                        Some("initialization".to_string()),
                    );

                    let transient = matches!(
                        kind,
                        ErrorKind::AsrConnectionFailed
                            | ErrorKind::NetworkConnectionFailed
                            | ErrorKind::ServerTimeout
                    );

                    if self.options.enable_auto_retry
                        && transient
                        && attempt < self.options.max_retry_attempts
                    {
                        warn!(
                            attempt,
                            error = %error,
                            "Initialization failed, retrying"
                        );
                        tokio::time::sleep(Duration::from_millis(self.options.retry_delay_ms))
                            .await;
                        continue;
                    }

                    if self.options.enable_fallback_mode {
                        warn!(error = %error, "Initialization failed, entering fallback mode");
                        self.enable_fallback_mode();
                        return Ok(());
                    }

                    return Err(error);
                }
            }
        }
    }

    /// Speak `text`, degrading to a text echo in fallback mode
    pub async fn speak(&self, text: &str) -> OrchestratorResult<()> {
        if self.is_fallback_mode() {
            return self.fallback_text_display(text).await;
        }

        match self.inner.speak(text).await {
            Ok(()) => Ok(()),
            Err(error) => {
                let kind = Self::kind_for(&error);
                self.classifier.classify_as(
                    kind,
                    kind.default_severity(),
                    error.to_string(),
                    Some("tts_playback".to_string()),
                );

                if self.options.enable_fallback_mode {
                    self.fallback_text_display(text).await
                } else {
                    Err(error)
                }
            }
        }
    }

    /// Echo text as if it had been spoken
    ///
    /// Emits `FallbackTextDisplayed` followed by `TtsCompleted` so the
    /// session layer's flow continues unchanged.
    async fn fallback_text_display(&self, text: &str) -> OrchestratorResult<()> {
        tokio::time::sleep(Duration::from_millis(100)).await;

        self.inner.emit(OrchestratorEvent::FallbackTextDisplayed {
            text: text.to_string(),
        });
        self.inner.emit(OrchestratorEvent::TtsCompleted {
            text: text.to_string(),
            duration_ms: 0,
        });

        Ok(())
    }

    /// Start listening, or signal text input in fallback mode
    pub fn start_recording(&self) {
        if self.is_fallback_mode() {
            self.inner.emit(OrchestratorEvent::FallbackModeActive {
                message: "当前为降级模式，请使用文字输入".to_string(),
            });
            return;
        }

        if !self.inner.is_asr_connected() {
            self.classifier.classify_as(
                ErrorKind::AsrConnectionFailed,
                ErrorKind::AsrConnectionFailed.default_severity(),
                "ASR stream is not connected",
                Some("start_recording".to_string()),
            );

            if self.options.enable_fallback_mode {
                self.enable_fallback_mode();
                self.inner.emit(OrchestratorEvent::FallbackModeActive {
                    message: "当前为降级模式，请使用文字输入".to_string(),
                });
                return;
            }
        }

        self.inner.start_recording();
    }

    /// Manually end the user's answer
    pub fn stop_recording(&self) {
        self.inner.stop_recording();
    }

    /// Stop speech output and listening together
    pub fn stop_all_audio(&self) {
        self.inner.stop_all_audio();
    }

    /// Reconnect the ASR stream through the retry manager
    ///
    /// A successful reconnect leaves fallback mode.
    pub async fn retry_asr_connection(&self) -> bool {
        let inner = Arc::clone(&self.inner);
        let result = self
            .retry_manager
            .retry(
                "asr_connection",
                move || {
                    let inner = Arc::clone(&inner);
                    async move { inner.reconnect_asr().await.map_err(anyhow::Error::from) }
                },
                &RetryConfig::audio(),
                RetryOptions::default(),
            )
            .await;

        match result {
            Ok(()) => {
                info!("ASR connection restored");
                self.disable_fallback_mode();
                true
            }
            Err(error) => {
                warn!(error = %error, "ASR reconnect failed");
                false
            }
        }
    }

    /// Re-probe the synthesis service
    ///
    /// Availability leaves fallback mode.
    pub async fn retry_tts_service(&self) -> bool {
        if self.inner.probe_tts().await {
            info!("TTS service restored");
            self.disable_fallback_mode();
            true
        } else {
            false
        }
    }

    /// Switch to text-interaction mode
    pub fn enable_fallback_mode(&self) {
        if !self.fallback_mode.swap(true, Ordering::SeqCst) {
            info!("Fallback mode enabled");
            self.inner.emit(OrchestratorEvent::FallbackModeEnabled {
                message: "已切换到降级模式，部分功能可能受限".to_string(),
            });
        }
    }

    /// Leave text-interaction mode
    pub fn disable_fallback_mode(&self) {
        if self.fallback_mode.swap(false, Ordering::SeqCst) {
            info!("Fallback mode disabled");
            self.inner.emit(OrchestratorEvent::FallbackModeDisabled);
        }
    }

    /// Whether the session is degraded to text interaction
    pub fn is_fallback_mode(&self) -> bool {
        self.fallback_mode.load(Ordering::SeqCst)
    }

    /// Whether the wrapped orchestrator is fully operational
    pub fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    /// Whether any critical error has been recorded
    pub fn has_critical_errors(&self) -> bool {
        self.classifier.has_critical_errors()
    }

    /// The classifier recording this wrapper's failures
    pub fn classifier(&self) -> &Arc<ErrorClassifier> {
        &self.classifier
    }

    /// Forget recorded errors and retry bookkeeping
    pub fn clear_error_history(&self) {
        self.classifier.clear_history();
        self.retry_manager.clear_all_retry_states();
    }

    /// Release the wrapped orchestrator's resources
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    /// Map an orchestration failure onto the error taxonomy
    fn kind_for(error: &OrchestratorError) -> ErrorKind {
        match error {
            OrchestratorError::Audio(AudioError::DeviceNotFound) => {
                ErrorKind::MicrophoneAccessDenied
            }
            OrchestratorError::Audio(_) => ErrorKind::AudioInitializationFailed,
            OrchestratorError::Asr(_) => ErrorKind::AsrConnectionFailed,
            OrchestratorError::Turn(_) => ErrorKind::AudioInitializationFailed,
            OrchestratorError::TtsFailed(_) | OrchestratorError::NoAudioSink => {
                ErrorKind::TtsServiceUnavailable
            }
            OrchestratorError::NotInitialized => ErrorKind::AudioServiceError,
        }
    }
}
