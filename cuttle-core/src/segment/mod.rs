//! Segment boundary detection.
//!
//! Two interchangeable strategies cut long audio into recognizer-sized
//! pieces:
//!
//! - [`streaming::VadSegmenter`] consumes fixed-size windows incrementally
//!   and emits speech segments as soon as they end, holding at most its
//!   buffer horizon in memory.
//! - [`silence::SilencePointChooser`] plans cut points over a whole file from
//!   a one-shot silence analysis, for engines without their own VAD.
//!
//! Both produce [`SpeechSegment`]s that are non-overlapping and ordered by
//! `start_sample`.

pub mod ffmpeg;
pub mod silence;
pub mod streaming;

pub use ffmpeg::FfmpegSilenceDetector;
pub use silence::{
    detect_silence_in_samples, split_at_cuts, ChooserConfig, SilenceDetector, SilenceInterval,
    SilencePointChooser,
};
pub use streaming::{SegmenterConfig, SegmenterStats, VadSegmenter};

use crate::buffering::chunk::samples_to_secs;

/// A contiguous slice of audio destined for one recognizer call.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechSegment {
    pub samples: Vec<f32>,
    /// Absolute offset of the first sample within the job's audio.
    pub start_sample: usize,
}

impl SpeechSegment {
    pub fn new(samples: Vec<f32>, start_sample: usize) -> Self {
        Self {
            samples,
            start_sample,
        }
    }

    /// Absolute offset one past the last sample.
    pub fn end_sample(&self) -> usize {
        self.start_sample + self.samples.len()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn start_secs(&self, sample_rate: u32) -> f64 {
        samples_to_secs(self.start_sample, sample_rate)
    }

    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        samples_to_secs(self.samples.len(), sample_rate)
    }
}
