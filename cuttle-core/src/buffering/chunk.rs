//! Typed sample buffer handed from the PCM source to the segmenters.

use std::ops::Range;

/// A contiguous block of mono PCM samples at a known sample rate.
///
/// One `AudioChunk` holds the decoded audio of one transcription job. The
/// sample rate never changes for the lifetime of the job.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000).
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Returns the duration of this chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        samples_to_secs(self.samples.len(), self.sample_rate)
    }

    /// Returns true if the chunk contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Borrow a sample range, clamped to the chunk bounds.
    pub fn range(&self, range: Range<usize>) -> &[f32] {
        let end = range.end.min(self.samples.len());
        let start = range.start.min(end);
        &self.samples[start..end]
    }
}

/// Convert a sample count to seconds at `sample_rate`.
pub fn samples_to_secs(samples: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    samples as f64 / sample_rate as f64
}

/// Convert seconds to a whole sample count at `sample_rate` (rounded).
pub fn secs_to_samples(secs: f64, sample_rate: u32) -> usize {
    if secs <= 0.0 {
        return 0;
    }
    (secs * sample_rate as f64).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_matches_rate() {
        let chunk = AudioChunk::new(vec![0.0; 24_000], 16_000);
        assert!((chunk.duration_secs() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn range_is_clamped() {
        let chunk = AudioChunk::new((0..10).map(|i| i as f32).collect(), 16_000);
        assert_eq!(chunk.range(8..20), &[8.0, 9.0]);
        assert!(chunk.range(12..20).is_empty());
    }

    #[test]
    fn seconds_round_trip_to_samples() {
        assert_eq!(secs_to_samples(0.25, 16_000), 4_000);
        assert_eq!(secs_to_samples(-1.0, 16_000), 0);
        assert_eq!(samples_to_secs(8_000, 0), 0.0);
    }
}
