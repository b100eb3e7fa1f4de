use thiserror::Error;

use crate::asr::AsrError;
use crate::audio::AudioError;
use crate::turn::TurnError;

/// Audio orchestration errors
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Microphone capture error
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    /// Recognition channel error
    #[error("ASR error: {0}")]
    Asr(#[from] AsrError),

    /// Turn coordination error
    #[error("Turn error: {0}")]
    Turn(#[from] TurnError),

    /// Speech synthesis or playback failed
    #[error("TTS failed: {0}")]
    TtsFailed(String),

    /// Buffered playback requested without an audio sink
    #[error("No audio sink configured for buffered playback")]
    NoAudioSink,

    /// The orchestrator has not been initialized
    #[error("Orchestrator is not initialized")]
    NotInitialized,
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
