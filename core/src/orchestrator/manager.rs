/// Audio service orchestration
///
/// [`AudioOrchestrator`] wires the turn coordinator's events to the real
/// I/O collaborators: microphone capture, the streaming recognition
/// channel and the speech synthesizer. Turn changes gate the audio
/// stream — chunks only flow to the server while the user owns the turn.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::asr::{AsrResult, AsrSession, AsrStreamEvent, SpeechRecognitionChannel};
use crate::audio::MicrophoneCapture;
use crate::tts::{estimate_speech_duration, AudioSink, PlaybackStrategy, SpeechSynthesizer, TtsConfig};
use crate::turn::{TurnConfig, TurnCoordinator, TurnEvent, TurnState};

use super::error::{OrchestratorError, OrchestratorResult};

/// Events emitted by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum OrchestratorEvent {
    /// All collaborators are wired up
    Initialized,

    /// Turn ownership changed
    TurnStateChanged { state: TurnState },

    /// Input level sample (forwarded from the turn coordinator)
    AudioLevel { volume: f32, timestamp_ms: u64 },

    /// Audio chunks started flowing to the recognition server
    RecordingStarted,

    /// Audio chunks stopped flowing
    RecordingStopped,

    /// The user's turn ended
    SpeechEnded { manual: bool, silence_ms: Option<u64> },

    /// Listening timed out without speech
    ListeningTimeout,

    /// A recognition result arrived (partial or final)
    AsrResult { result: AsrResult },

    /// A final, non-empty recognition result arrived
    SpeechRecognized { result: AsrResult },

    /// The recognition server disconnected
    AsrDisconnected { reason: String },

    /// The synthesis service answered the availability probe
    TtsAvailable,

    /// The synthesis service is unreachable
    TtsUnavailable,

    /// Spoken output started
    TtsStarted { text: String },

    /// Spoken output finished
    TtsCompleted { text: String, duration_ms: u64 },

    /// Spoken output was interrupted
    TtsStopped,

    /// Fallback mode echoed text instead of speaking it
    FallbackTextDisplayed { text: String },

    /// Recording was requested while in fallback mode
    FallbackModeActive { message: String },

    /// Fallback mode switched on
    FallbackModeEnabled { message: String },

    /// Fallback mode switched off
    FallbackModeDisabled,
}

/// Wires turn coordination into capture, recognition and synthesis
///
/// Owns the microphone stream and the recognition channel exclusively.
/// The turn coordinator polls an audio level handle derived from the
/// capture, so the orchestrator must outlive it; both are torn down
/// together in [`AudioOrchestrator::destroy`].
pub struct AudioOrchestrator {
    turn: Arc<TurnCoordinator>,
    capture: Mutex<Box<dyn MicrophoneCapture>>,
    channel: tokio::sync::Mutex<Box<dyn SpeechRecognitionChannel>>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: Option<Arc<dyn AudioSink>>,
    tts_config: Mutex<TtsConfig>,
    listeners: Arc<Mutex<Vec<mpsc::Sender<OrchestratorEvent>>>>,
    /// Streaming gate: chunks flow to the server only while set
    audio_gate: Arc<AtomicBool>,
    asr_audio_tx: Arc<Mutex<Option<mpsc::Sender<Vec<u8>>>>>,
    asr_connected: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    initialized: AtomicBool,
}

impl AudioOrchestrator {
    /// Create an orchestrator over the given collaborators
    ///
    /// `sink` is only required for the buffered playback strategy.
    pub fn new(
        turn_config: TurnConfig,
        capture: Box<dyn MicrophoneCapture>,
        channel: Box<dyn SpeechRecognitionChannel>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: Option<Arc<dyn AudioSink>>,
        tts_config: TtsConfig,
    ) -> Self {
        Self {
            turn: Arc::new(TurnCoordinator::new(turn_config)),
            capture: Mutex::new(capture),
            channel: tokio::sync::Mutex::new(channel),
            synthesizer,
            sink,
            tts_config: Mutex::new(tts_config),
            listeners: Arc::new(Mutex::new(Vec::new())),
            audio_gate: Arc::new(AtomicBool::new(false)),
            asr_audio_tx: Arc::new(Mutex::new(None)),
            asr_connected: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Subscribe to orchestrator events
    pub fn subscribe(&self) -> mpsc::Receiver<OrchestratorEvent> {
        let (tx, rx) = mpsc::channel(64);
        self.listeners.lock().unwrap().push(tx);
        rx
    }

    pub(crate) fn emit(&self, event: OrchestratorEvent) {
        let listeners = self.listeners.lock().unwrap();
        for listener in listeners.iter() {
            let _ = listener.try_send(event.clone());
        }
    }

    /// The turn coordinator driving this orchestrator
    pub fn turn(&self) -> Arc<TurnCoordinator> {
        Arc::clone(&self.turn)
    }

    /// Initialize capture, turn coordination and the recognition stream
    ///
    /// Idempotent: a second call returns Ok without doing anything.
    /// On failure all partially-acquired resources are released, so the
    /// call may be retried.
    pub async fn initialize(&self) -> OrchestratorResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        info!("Initializing audio orchestrator");

        let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<u8>>(100);

        let level_source = {
            let mut capture = self.capture.lock().unwrap();
            capture.start(chunk_tx)?;
            capture.level_source()
        };

        if let Err(e) = self.turn.initialize(level_source) {
            self.capture.lock().unwrap().stop();
            return Err(e.into());
        }

        let session = {
            let mut channel = self.channel.lock().await;
            match channel.open().await {
                Ok(session) => session,
                Err(e) => {
                    self.turn.destroy();
                    self.capture.lock().unwrap().stop();
                    return Err(e.into());
                }
            }
        };

        self.install_session(session);
        self.spawn_chunk_pump(chunk_rx);
        self.spawn_turn_event_loop();

        // TTS availability probe is advisory; a missing service does not
        // fail initialization
        if self.synthesizer.is_available().await {
            self.emit(OrchestratorEvent::TtsAvailable);
        } else {
            warn!("TTS service is not available");
            self.emit(OrchestratorEvent::TtsUnavailable);
        }

        self.initialized.store(true, Ordering::SeqCst);
        self.emit(OrchestratorEvent::Initialized);
        info!("Audio orchestrator initialized");

        Ok(())
    }

    /// Install a fresh recognition stream and spawn its result loop
    fn install_session(&self, session: AsrSession) {
        let AsrSession {
            audio_tx,
            mut events_rx,
        } = session;

        *self.asr_audio_tx.lock().unwrap() = Some(audio_tx);
        self.asr_connected.store(true, Ordering::SeqCst);

        let listeners = Arc::clone(&self.listeners);
        let asr_connected = Arc::clone(&self.asr_connected);

        let task = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                match event {
                    AsrStreamEvent::Result(result) => {
                        Self::emit_to(&listeners, OrchestratorEvent::AsrResult {
                            result: result.clone(),
                        });

                        if result.is_final && !result.text.trim().is_empty() {
                            Self::emit_to(
                                &listeners,
                                OrchestratorEvent::SpeechRecognized { result },
                            );
                        }
                    }
                    AsrStreamEvent::Disconnected { reason } => {
                        warn!(reason = %reason, "ASR stream disconnected");
                        asr_connected.store(false, Ordering::SeqCst);
                        Self::emit_to(
                            &listeners,
                            OrchestratorEvent::AsrDisconnected { reason },
                        );
                        break;
                    }
                }
            }
            debug!("ASR result loop finished");
        });

        self.tasks.lock().unwrap().push(task);
    }

    /// Forward captured chunks to the recognition stream while the gate
    /// is open
    fn spawn_chunk_pump(&self, mut chunk_rx: mpsc::Receiver<Vec<u8>>) {
        let gate = Arc::clone(&self.audio_gate);
        let audio_tx = Arc::clone(&self.asr_audio_tx);
        let asr_connected = Arc::clone(&self.asr_connected);

        let task = tokio::spawn(async move {
            while let Some(chunk) = chunk_rx.recv().await {
                if !gate.load(Ordering::SeqCst) {
                    continue;
                }

                let tx = audio_tx.lock().unwrap().clone();
                if let Some(tx) = tx {
                    // Chunk send failures must not take down the capture
                    // loop; the stream is simply marked disconnected
                    if tx.send(chunk).await.is_err() {
                        if asr_connected.swap(false, Ordering::SeqCst) {
                            warn!("ASR stream rejected audio chunk, marking disconnected");
                        }
                    }
                }
            }
            debug!("Chunk pump finished");
        });

        self.tasks.lock().unwrap().push(task);
    }

    /// React to turn changes: gate streaming and forward events upward
    fn spawn_turn_event_loop(&self) {
        let mut turn_rx = self.turn.subscribe();
        let gate = Arc::clone(&self.audio_gate);
        let listeners = Arc::clone(&self.listeners);

        let task = tokio::spawn(async move {
            while let Some(event) = turn_rx.recv().await {
                match event {
                    TurnEvent::StateChanged { state } => {
                        Self::emit_to(&listeners, OrchestratorEvent::TurnStateChanged { state });

                        match state {
                            TurnState::UserSpeaking => {
                                gate.store(true, Ordering::SeqCst);
                                Self::emit_to(&listeners, OrchestratorEvent::RecordingStarted);
                            }
                            TurnState::Processing | TurnState::Idle | TurnState::AiSpeaking => {
                                if gate.swap(false, Ordering::SeqCst) {
                                    Self::emit_to(
                                        &listeners,
                                        OrchestratorEvent::RecordingStopped,
                                    );
                                }
                            }
                            TurnState::ListeningForUser => {}
                        }
                    }
                    TurnEvent::AudioLevel {
                        volume,
                        timestamp_ms,
                    } => {
                        Self::emit_to(
                            &listeners,
                            OrchestratorEvent::AudioLevel {
                                volume,
                                timestamp_ms,
                            },
                        );
                    }
                    TurnEvent::UserFinishedSpeaking { manual, silence_ms } => {
                        Self::emit_to(
                            &listeners,
                            OrchestratorEvent::SpeechEnded { manual, silence_ms },
                        );
                    }
                    TurnEvent::ListeningTimeout => {
                        Self::emit_to(&listeners, OrchestratorEvent::ListeningTimeout);
                    }
                    _ => {}
                }
            }
            debug!("Turn event loop finished");
        });

        self.tasks.lock().unwrap().push(task);
    }

    fn emit_to(
        listeners: &Arc<Mutex<Vec<mpsc::Sender<OrchestratorEvent>>>>,
        event: OrchestratorEvent,
    ) {
        let listeners = listeners.lock().unwrap();
        for listener in listeners.iter() {
            let _ = listener.try_send(event.clone());
        }
    }

    /// Speak `text`, holding the AI turn for the duration
    ///
    /// Uses the configured playback strategy. The turn coordinator is
    /// always released (`on_ai_turn_complete`) on completion *and* on
    /// failure, so the turn machine can never be left stuck in
    /// `AiSpeaking`.
    pub async fn speak(&self, text: &str) -> OrchestratorResult<()> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(OrchestratorError::NotInitialized);
        }

        let config = self.tts_config.lock().unwrap().clone();
        let params = config.resolved_voice();

        self.turn.start_ai_turn();
        self.emit(OrchestratorEvent::TtsStarted {
            text: text.to_string(),
        });

        let result = match config.strategy {
            PlaybackStrategy::Direct => self.synthesizer.speak(text, &params).await,
            PlaybackStrategy::Buffered => match &self.sink {
                Some(sink) => match self.synthesizer.synthesize(text, &params).await {
                    Ok(audio) => sink.play(audio).await,
                    Err(e) => Err(e),
                },
                None => {
                    self.turn.on_ai_turn_complete();
                    return Err(OrchestratorError::NoAudioSink);
                }
            },
        };

        self.turn.on_ai_turn_complete();

        match result {
            Ok(()) => {
                self.emit(OrchestratorEvent::TtsCompleted {
                    text: text.to_string(),
                    duration_ms: estimate_speech_duration(text).as_millis() as u64,
                });
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "TTS playback failed");
                Err(OrchestratorError::TtsFailed(e.to_string()))
            }
        }
    }

    /// Interrupt any in-progress spoken output
    pub fn stop_speaking(&self) {
        if let Some(sink) = &self.sink {
            sink.stop();
        }

        if self.turn.state() == TurnState::AiSpeaking {
            self.turn.on_ai_turn_complete();
        }

        self.emit(OrchestratorEvent::TtsStopped);
    }

    /// Start listening for the user's answer
    pub fn start_recording(&self) {
        self.turn.start_listening();
    }

    /// Manually end the user's answer
    pub fn stop_recording(&self) {
        self.turn.manual_end_speaking();
    }

    /// Stop speech output and listening together
    pub fn stop_all_audio(&self) {
        self.stop_speaking();
        self.turn.stop_listening();
    }

    /// Reopen the recognition stream
    ///
    /// Used by recovery after an `AsrConnectionFailed`.
    pub async fn reconnect_asr(&self) -> OrchestratorResult<()> {
        info!("Reconnecting ASR stream");

        let session = {
            let mut channel = self.channel.lock().await;
            channel.open().await?
        };

        self.install_session(session);
        Ok(())
    }

    /// Whether the recognition stream currently accepts audio
    pub fn is_asr_connected(&self) -> bool {
        if !self.asr_connected.load(Ordering::SeqCst) {
            return false;
        }

        self.asr_audio_tx
            .lock()
            .unwrap()
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    /// Whether the orchestrator is fully wired up
    pub fn is_ready(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
            && self.capture.lock().unwrap().is_capturing()
            && self.is_asr_connected()
    }

    /// Replace the synthesis configuration
    pub fn update_tts_config(&self, config: TtsConfig) {
        *self.tts_config.lock().unwrap() = config;
    }

    /// Probe the synthesis service and report the result as an event
    pub async fn probe_tts(&self) -> bool {
        let available = self.synthesizer.is_available().await;
        if available {
            self.emit(OrchestratorEvent::TtsAvailable);
        } else {
            self.emit(OrchestratorEvent::TtsUnavailable);
        }
        available
    }

    /// Release every exclusively-owned resource
    ///
    /// Safe to call multiple times.
    pub fn destroy(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        debug!("Destroying audio orchestrator");

        self.audio_gate.store(false, Ordering::SeqCst);
        *self.asr_audio_tx.lock().unwrap() = None;
        self.asr_connected.store(false, Ordering::SeqCst);

        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }

        self.capture.lock().unwrap().stop();
        self.turn.destroy();
    }
}

impl Drop for AudioOrchestrator {
    fn drop(&mut self) {
        self.destroy();
    }
}
