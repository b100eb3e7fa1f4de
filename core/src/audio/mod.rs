/// Microphone capture and PCM chunking
pub mod capture;

/// Audio-related error types
pub mod error;

/// Input level metering for voice activity detection
pub mod level;

/// Audio resampling
pub mod resampler;

// Re-export commonly used types
pub use capture::{CaptureConfig, CpalCapture, MicrophoneCapture, ASR_SAMPLE_RATE, CHUNK_MS};
pub use error::{AudioError, AudioResult};
pub use level::{AudioLevelSource, LevelMeter};
pub use resampler::PcmResampler;
