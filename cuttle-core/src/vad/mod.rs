//! Voice Activity Detection (VAD) frame classifiers.
//!
//! The `VoiceActivityDetector` trait is the extensibility point of the
//! streaming segmenter: swap in `EnergyVad` (always available), `SileroVad`
//! (`onnx` feature) or any future neural VAD without touching segmentation.
//! Detectors only score frames; run-length bookkeeping lives in
//! [`crate::segment::streaming::VadSegmenter`].

pub mod energy;

#[cfg(feature = "onnx")]
pub mod silero;

#[cfg(feature = "onnx")]
pub use silero::SileroVad;

pub use energy::EnergyVad;

use crate::error::Result;

/// Whether a given audio frame contains speech or silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    /// Speech probability at or above the threshold.
    Speech,
    /// Below threshold.
    Silence,
}

impl VadDecision {
    pub fn from_probability(probability: f32, threshold: f32) -> Self {
        if probability >= threshold {
            VadDecision::Speech
        } else {
            VadDecision::Silence
        }
    }

    pub fn is_speech(self) -> bool {
        self == VadDecision::Speech
    }
}

/// Trait for all VAD implementations.
///
/// Implementors may be stateful (hangover counters, RNN hidden states, etc.).
pub trait VoiceActivityDetector: Send + 'static {
    /// Score one frame, returning a speech probability in [0, 1].
    ///
    /// Frames are `window_size` samples long, except the final partial frame
    /// at flush. That frame is zero-padded to `window_size` only when
    /// [`required_frame_size`](Self::required_frame_size) returns `Some`.
    fn speech_probability(&mut self, frame: &[f32]) -> Result<f32>;

    /// Frame length this detector requires, if it has a fixed one.
    fn required_frame_size(&self) -> Option<usize> {
        None
    }

    /// Reset any internal state (e.g. hangover counters, hidden states).
    fn reset(&mut self);
}

impl<T: VoiceActivityDetector + ?Sized> VoiceActivityDetector for Box<T> {
    fn speech_probability(&mut self, frame: &[f32]) -> Result<f32> {
        (**self).speech_probability(frame)
    }

    fn required_frame_size(&self) -> Option<usize> {
        (**self).required_frame_size()
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_threshold_is_inclusive() {
        assert_eq!(VadDecision::from_probability(0.5, 0.5), VadDecision::Speech);
        assert_eq!(VadDecision::from_probability(0.49, 0.5), VadDecision::Silence);
        assert!(VadDecision::from_probability(0.9, 0.5).is_speech());
    }
}
