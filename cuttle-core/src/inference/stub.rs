//! `StubRecognizer`: placeholder engine that describes its input instead of
//! running real recognition.
//!
//! Lets the segmentation and stitching path be exercised end-to-end without a
//! model: every buffer of non-trivial length becomes
//! `"[stub: <N> samples @ <SR> Hz]"`.

use tracing::debug;

use crate::error::Result;
use crate::inference::{Recognition, Recognizer};

/// Shortest buffer (samples) the stub answers; shorter input yields no text.
const MIN_SAMPLES: usize = 160;

pub struct StubRecognizer {
    max_duration_secs: f64,
    utterance_count: u32,
}

impl StubRecognizer {
    pub fn new(max_duration_secs: f64) -> Self {
        Self {
            max_duration_secs,
            utterance_count: 0,
        }
    }

    /// Number of non-trivial buffers recognised so far.
    pub fn utterance_count(&self) -> u32 {
        self.utterance_count
    }
}

impl Default for StubRecognizer {
    fn default() -> Self {
        Self::new(30.0)
    }
}

impl Recognizer for StubRecognizer {
    fn name(&self) -> &str {
        "stub"
    }

    fn max_duration_secs(&self) -> f64 {
        self.max_duration_secs
    }

    fn recognize(&mut self, samples: &[f32], sample_rate: u32) -> Result<Recognition> {
        if samples.len() < MIN_SAMPLES {
            return Ok(Recognition::default());
        }
        self.utterance_count += 1;
        debug!(utterance = self.utterance_count, samples = samples.len(), "stub recognize");
        Ok(Recognition {
            text: format!("[stub: {} samples @ {} Hz]", samples.len(), sample_rate),
            confidence: Some(1.0),
            ..Recognition::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_buffers_are_blank() {
        let mut stub = StubRecognizer::default();
        assert!(stub.recognize(&[0.0; 10], 16_000).unwrap().is_blank());
        assert_eq!(stub.utterance_count(), 0);
    }

    #[test]
    fn describes_buffer() {
        let mut stub = StubRecognizer::default();
        let r = stub.recognize(&[0.0; 1600], 16_000).unwrap();
        assert_eq!(r.text, "[stub: 1600 samples @ 16000 Hz]");
        assert_eq!(stub.utterance_count(), 1);
    }
}
