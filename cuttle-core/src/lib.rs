//! # cuttle-core
//!
//! Long-form transcription: cut hours of audio into recognizer-sized
//! segments, recognise them one by one and stitch the results onto one
//! timeline, then score the transcript with word error rate.
//!
//! ## Architecture
//!
//! ```text
//! PcmSource::decode → AudioChunk
//!                        │
//!        ┌───────────────┴────────────────┐
//!  VadSegmenter (streaming)     SilencePointChooser (silence cuts)
//!        └───────────────┬────────────────┘
//!                  SpeechSegment*
//!                        │
//!          stitch → Recognizer::recognize (per segment)
//!                        │
//!                   Transcript ──► scoring::calculate_wer
//! ```
//!
//! The library logs through `tracing` and never installs a subscriber.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod engine;
pub mod error;
pub mod inference;
pub mod scoring;
pub mod segment;
pub mod transcript;
pub mod vad;

// Convenience re-exports for downstream crates
pub use audio::{DecodedAudio, PcmSource, WavSource};
pub use buffering::chunk::AudioChunk;
pub use engine::pipeline::{stitch, DiagnosticsSnapshot, PipelineDiagnostics};
pub use engine::{Strategy, Transcriber, TranscriberConfig};
pub use error::{CuttleError, Result};
pub use inference::{Recognition, Recognizer, RecognizerHandle, StubRecognizer};
pub use scoring::{aggregate_wer, calculate_wer, normalize_words, AlignmentResult};
pub use segment::{
    ChooserConfig, FfmpegSilenceDetector, SegmenterConfig, SilenceDetector, SilenceInterval,
    SilencePointChooser, SpeechSegment, VadSegmenter,
};
pub use transcript::{TimedText, Transcript, TranscriptProgress};
pub use vad::{EnergyVad, VadDecision, VoiceActivityDetector};

#[cfg(feature = "http")]
pub use inference::{HttpRecognizer, HttpRecognizerConfig};

#[cfg(feature = "onnx")]
pub use vad::SileroVad;
