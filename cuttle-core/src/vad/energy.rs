//! Energy-based VAD using an RMS reference level + hangover counter.
//!
//! ## Algorithm
//!
//! 1. Compute RMS of the incoming frame.
//! 2. Map it to a pseudo-probability `rms / (2 * reference)`, clamped to
//!    [0, 1], so a frame exactly at the reference level scores 0.5.
//! 3. While the hangover counter is running, frames that fall below 0.5
//!    repeat the probability of the last speech frame, so they land on the
//!    same side of any segmenter threshold as that frame did.

use super::VoiceActivityDetector;
use crate::error::Result;

/// A simple energy-based voice activity detector.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    /// RMS amplitude that maps to probability 0.5.
    /// Typical range: 0.01–0.05 for speech recorded at normal level.
    reference_rms: f32,
    /// How many consecutive quiet frames still score as speech after real
    /// speech ends.
    hangover_frames: u32,
    hangover_counter: u32,
    last_speech_prob: f32,
}

impl EnergyVad {
    /// Create a new `EnergyVad`.
    ///
    /// # Parameters
    /// - `reference_rms`: RMS level that scores exactly 0.5. Default: `0.02`.
    /// - `hangover_frames`: Number of quiet frames to extend speech detection.
    ///   Default: `0` (the segmenter's minimum silence already debounces).
    pub fn new(reference_rms: f32, hangover_frames: u32) -> Self {
        Self {
            reference_rms: reference_rms.max(f32::EPSILON),
            hangover_frames,
            hangover_counter: 0,
            last_speech_prob: 0.0,
        }
    }

    /// Compute the root-mean-square of a sample slice.
    pub fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(0.02, 0)
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn speech_probability(&mut self, frame: &[f32]) -> Result<f32> {
        let prob = (Self::rms(frame) / (2.0 * self.reference_rms)).clamp(0.0, 1.0);

        if prob >= 0.5 {
            self.hangover_counter = self.hangover_frames;
            self.last_speech_prob = prob;
            Ok(prob)
        } else if self.hangover_counter > 0 {
            self.hangover_counter -= 1;
            Ok(self.last_speech_prob)
        } else {
            Ok(prob)
        }
    }

    fn reset(&mut self) {
        self.hangover_counter = 0;
        self.last_speech_prob = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn silent(len: usize) -> Vec<f32> {
        vec![0.0f32; len]
    }

    fn loud(amplitude: f32, len: usize) -> Vec<f32> {
        vec![amplitude; len]
    }

    #[test]
    fn silence_scores_zero() {
        let mut vad = EnergyVad::new(0.02, 0);
        assert_eq!(vad.speech_probability(&silent(512)).unwrap(), 0.0);
    }

    #[test]
    fn reference_level_scores_half() {
        let mut vad = EnergyVad::new(0.02, 0);
        let p = vad.speech_probability(&loud(0.02, 512)).unwrap();
        assert_relative_eq!(p, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn loud_frames_saturate() {
        let mut vad = EnergyVad::new(0.02, 0);
        assert_eq!(vad.speech_probability(&loud(0.5, 512)).unwrap(), 1.0);
    }

    #[test]
    fn hangover_extends_speech() {
        let mut vad = EnergyVad::new(0.02, 2);
        vad.speech_probability(&loud(0.5, 512)).unwrap();

        assert_eq!(vad.speech_probability(&silent(512)).unwrap(), 1.0);
        assert_eq!(vad.speech_probability(&silent(512)).unwrap(), 1.0);
        // Hangover exhausted
        assert_eq!(vad.speech_probability(&silent(512)).unwrap(), 0.0);
    }

    #[test]
    fn hangover_bridges_gaps_above_default_threshold() {
        use crate::segment::{SegmenterConfig, VadSegmenter};

        let mut samples = loud(0.3, 10 * 512);
        samples.extend(silent(3 * 512));
        samples.extend(loud(0.3, 10 * 512));

        let config = SegmenterConfig {
            threshold: 0.6,
            min_silence_duration: 2.0 * 512.0 / 16_000.0,
            ..SegmenterConfig::default()
        };
        let mut seg = VadSegmenter::new(config, EnergyVad::new(0.02, 5)).unwrap();
        seg.accept_waveform(&samples);
        seg.flush();

        let mut count = 0;
        while seg.pop().is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[test]
    fn reset_clears_hangover() {
        let mut vad = EnergyVad::new(0.02, 5);
        vad.speech_probability(&loud(0.5, 512)).unwrap();
        vad.reset();
        assert_eq!(vad.speech_probability(&silent(512)).unwrap(), 0.0);
    }

    #[test]
    fn rms_of_square_wave() {
        let samples: Vec<f32> = (0..256)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        assert_relative_eq!(EnergyVad::rms(&samples), 0.5, epsilon = 1e-5);
        assert_eq!(EnergyVad::rms(&[]), 0.0);
    }
}
