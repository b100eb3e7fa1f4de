use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::{debug, info};

use super::error::{AudioError, AudioResult};

/// Converts captured audio to the 16 kHz mono stream the ASR channel expects
///
/// Wraps a rubato Sinc resampler and an accumulation buffer so callers can
/// feed capture buffers of arbitrary length and receive whatever resampled
/// audio is ready.
pub struct PcmResampler {
    resampler: SincFixedIn<f32>,
    input_buffer: Vec<Vec<f32>>,
    output_buffer: Vec<Vec<f32>>,
    pending: Vec<f32>,
    input_rate: u32,
    output_rate: u32,
    frame_size: usize,
}

impl PcmResampler {
    /// Create a resampler from `input_rate` to `output_rate`
    ///
    /// Internally processes 10 ms frames of the input rate. A 1:1 rate is
    /// allowed; rubato still applies its filter in that case.
    pub fn new(input_rate: u32, output_rate: u32) -> AudioResult<Self> {
        info!("Creating resampler: {} Hz -> {} Hz", input_rate, output_rate);

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        // 10ms of input audio per frame
        let frame_size = (input_rate / 100) as usize;

        let resampler = SincFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            2.0,
            params,
            frame_size,
            1,
        )
        .map_err(|e| AudioError::ResampleFailed(format!("Failed to create resampler: {}", e)))?;

        let input_buffer = resampler.input_buffer_allocate(true);
        let output_buffer = resampler.output_buffer_allocate(true);

        debug!(
            "Resampler ready: frame_size={} ({} Hz), max output frames={}",
            frame_size,
            input_rate,
            resampler.output_frames_max()
        );

        Ok(Self {
            resampler,
            input_buffer,
            output_buffer,
            pending: Vec::new(),
            input_rate,
            output_rate,
            frame_size,
        })
    }

    /// Feed capture samples, returning whatever resampled audio is ready
    ///
    /// Input of any length is accepted; samples that do not yet fill a
    /// complete 10 ms frame stay buffered for the next call.
    pub fn feed(&mut self, input: &[f32]) -> AudioResult<Vec<f32>> {
        self.pending.extend_from_slice(input);

        let mut output = Vec::new();

        while self.pending.len() >= self.frame_size {
            let frame: Vec<f32> = self.pending.drain(..self.frame_size).collect();
            self.input_buffer[0].copy_from_slice(&frame);

            let (_, generated) = self
                .resampler
                .process_into_buffer(&self.input_buffer, &mut self.output_buffer, None)
                .map_err(|e| AudioError::ResampleFailed(format!("Resampling failed: {}", e)))?;

            output.extend_from_slice(&self.output_buffer[0][..generated]);
        }

        Ok(output)
    }

    /// Discard buffered samples and reset the filter state
    pub fn reset(&mut self) {
        debug!("Resetting resampler");
        self.resampler.reset();
        self.pending.clear();
        for channel in &mut self.input_buffer {
            channel.fill(0.0);
        }
        for channel in &mut self.output_buffer {
            channel.fill(0.0);
        }
    }

    /// Input sample rate in Hz
    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Output sample rate in Hz
    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }
}

/// Convert f32 samples (range -1.0 to 1.0) to i16 PCM
pub fn f32_to_i16_pcm(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| (sample.clamp(-1.0, 1.0) * 32767.0) as i16)
        .collect()
}

/// Convert i16 samples to little-endian bytes
pub fn i16_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_48k_to_16k() {
        let mut resampler = PcmResampler::new(48000, 16000).unwrap();

        // 100ms @ 48kHz
        let input: Vec<f32> = (0..4800)
            .map(|i| (i as f32 * 0.01 * std::f32::consts::PI).sin())
            .collect();

        let output = resampler.feed(&input).unwrap();

        // Expect roughly 1/3 of the input length
        assert!(
            (output.len() as i32 - 1600).abs() < 200,
            "Expected ~1600 samples, got {}",
            output.len()
        );
        for &sample in &output {
            assert!(sample.abs() <= 1.001);
        }
    }

    #[test]
    fn test_feed_buffers_partial_frames() {
        let mut resampler = PcmResampler::new(48000, 16000).unwrap();

        // 200 samples is less than one 480-sample frame
        let output = resampler.feed(&vec![0.5; 200]).unwrap();
        assert!(output.is_empty());

        // Another 400 samples completes a frame
        let output = resampler.feed(&vec![0.5; 400]).unwrap();
        assert!(!output.is_empty());
    }

    #[test]
    fn test_reset_discards_pending() {
        let mut resampler = PcmResampler::new(48000, 16000).unwrap();

        resampler.feed(&vec![0.5; 200]).unwrap();
        resampler.reset();

        // After reset the partial frame is gone
        let output = resampler.feed(&vec![0.5; 400]).unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn test_f32_to_i16_conversion() {
        let samples = f32_to_i16_pcm(&[-1.0, -0.5, 0.0, 0.5, 1.0]);
        assert_eq!(samples[0], -32767);
        assert_eq!(samples[2], 0);
        assert_eq!(samples[4], 32767);

        // Out-of-range values are clamped
        let clamped = f32_to_i16_pcm(&[-2.0, 2.0]);
        assert_eq!(clamped, vec![-32767, 32767]);
    }

    #[test]
    fn test_i16_to_le_bytes() {
        let bytes = i16_to_le_bytes(&[0x1234, -1]);
        assert_eq!(bytes, vec![0x34, 0x12, 0xFF, 0xFF]);
    }
}
