/// Audio level sampling for voice activity detection
///
/// The turn coordinator polls an [`AudioLevelSource`] at a fixed cadence to
/// decide whether the candidate is speaking. The capture layer feeds a
/// [`LevelMeter`] from its input callback; the meter hands out cheap,
/// lock-free sources that snapshot the most recent RMS level.
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::error::AudioResult;

/// Capability for sampling the instantaneous input level
///
/// Implementations must be cheap to call at 10 Hz or faster and must
/// return a value normalized to `[0.0, 1.0]`.
pub trait AudioLevelSource: Send + Sync {
    /// Sample the current input level
    fn sample(&self) -> AudioResult<f32>;
}

/// Lock-free input level meter
///
/// The capture callback calls [`LevelMeter::update`] with each incoming
/// buffer; readers observe the RMS of the most recent buffer via
/// [`LevelMeter::source`]. Levels are stored as `f32` bits in an
/// `AtomicU32`, so neither side ever blocks the audio thread.
#[derive(Debug, Clone, Default)]
pub struct LevelMeter {
    level: Arc<AtomicU32>,
}

impl LevelMeter {
    /// Create a new meter reading 0.0
    pub fn new() -> Self {
        Self {
            level: Arc::new(AtomicU32::new(0.0f32.to_bits())),
        }
    }

    /// Update the meter from a buffer of f32 samples in [-1.0, 1.0]
    ///
    /// Stores the RMS of the buffer, clamped to `[0.0, 1.0]`. Empty
    /// buffers leave the previous reading in place.
    pub fn update(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }

        let sum_squares: f32 = samples.iter().map(|&s| s * s).sum();
        let rms = (sum_squares / samples.len() as f32).sqrt().clamp(0.0, 1.0);

        self.level.store(rms.to_bits(), Ordering::Relaxed);
    }

    /// Read the current level directly
    pub fn level(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed))
    }

    /// Create a sampling source backed by this meter
    pub fn source(&self) -> Arc<dyn AudioLevelSource> {
        Arc::new(MeterSource {
            level: Arc::clone(&self.level),
        })
    }
}

struct MeterSource {
    level: Arc<AtomicU32>,
}

impl AudioLevelSource for MeterSource {
    fn sample(&self) -> AudioResult<f32> {
        Ok(f32::from_bits(self.level.load(Ordering::Relaxed)))
    }
}
