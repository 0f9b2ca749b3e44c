//! Single-utterance recognizer abstraction.
//!
//! The `Recognizer` trait decouples the stitcher from any specific engine
//! (platform speech API, ONNX transducer, cloud API, HTTP ASR server).
//! Every engine sees one bounded-duration buffer at a time; segment-length
//! invariants upstream guarantee it never receives more than its window.
//!
//! `&mut self` on `recognize` expresses that decoders are stateful. All
//! mutation is serialised through `RecognizerHandle`'s `parking_lot::Mutex`,
//! which lets independent jobs share one engine instance.

pub mod stub;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{HttpRecognizer, HttpRecognizerConfig};

pub use stub::StubRecognizer;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Output of one recognizer call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recognition {
    pub text: String,
    /// Sub-word tokens, when the engine reports them.
    #[serde(default)]
    pub tokens: Vec<String>,
    /// Per-token start times in seconds relative to the buffer start.
    #[serde(default)]
    pub timestamps: Vec<f32>,
    /// Model confidence in [0.0, 1.0], if available.
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl Recognition {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// True when the engine produced nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Contract for speech recognition engines.
pub trait Recognizer: Send + 'static {
    /// Short engine name for logs and reports.
    fn name(&self) -> &str;

    /// Longest buffer (seconds) this engine accepts in one call.
    fn max_duration_secs(&self) -> f64;

    /// One-time warm-up: load weights or probe the remote service.
    ///
    /// # Errors
    /// Returns an error if the engine cannot be made ready. The job fails
    /// without producing a transcript.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Recognise one utterance of mono f32 samples.
    fn recognize(&mut self, samples: &[f32], sample_rate: u32) -> Result<Recognition>;
}

/// Thread-safe reference-counted handle to any `Recognizer` implementor.
#[derive(Clone)]
pub struct RecognizerHandle(pub Arc<Mutex<dyn Recognizer>>);

impl RecognizerHandle {
    /// Wrap any `Recognizer` in a `RecognizerHandle`.
    pub fn new<R: Recognizer>(recognizer: R) -> Self {
        Self(Arc::new(Mutex::new(recognizer)))
    }

    pub fn name(&self) -> String {
        self.0.lock().name().to_string()
    }

    pub fn max_duration_secs(&self) -> f64 {
        self.0.lock().max_duration_secs()
    }
}

impl std::fmt::Debug for RecognizerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognizerHandle").finish_non_exhaustive()
    }
}
