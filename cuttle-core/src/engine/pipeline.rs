//! Transcript stitching.
//!
//! ## Stages (per segment)
//!
//! ```text
//! 1. Check the cancellation flag
//! 2. Recognizer::recognize(segment samples)
//!    ├─ error → warn, count, drop the segment
//!    └─ blank → count, drop the segment
//! 3. Place the text on the timeline from start_sample / sample_rate
//! 4. Broadcast TranscriptProgress::Segment
//! ```
//!
//! Segments arrive non-overlapping and in order, so no deduplication or
//! reordering happens here. A job where every segment fails still yields a
//! (possibly empty) transcript.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    error::{CuttleError, Result},
    inference::RecognizerHandle,
    segment::{SegmenterStats, SpeechSegment},
    transcript::{TimedText, Transcript, TranscriptProgress},
};

/// Counters for one or more jobs. Relaxed atomics: values are for
/// observability only.
#[derive(Debug, Default)]
pub struct PipelineDiagnostics {
    pub segments_detected: AtomicUsize,
    pub recognizer_calls: AtomicUsize,
    pub recognizer_errors: AtomicUsize,
    pub empty_results: AtomicUsize,
    pub segments_emitted: AtomicUsize,
    pub forced_cuts: AtomicUsize,
    pub dropped_short: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.segments_detected.store(0, Ordering::Relaxed);
        self.recognizer_calls.store(0, Ordering::Relaxed);
        self.recognizer_errors.store(0, Ordering::Relaxed);
        self.empty_results.store(0, Ordering::Relaxed);
        self.segments_emitted.store(0, Ordering::Relaxed);
        self.forced_cuts.store(0, Ordering::Relaxed);
        self.dropped_short.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            segments_detected: self.segments_detected.load(Ordering::Relaxed),
            recognizer_calls: self.recognizer_calls.load(Ordering::Relaxed),
            recognizer_errors: self.recognizer_errors.load(Ordering::Relaxed),
            empty_results: self.empty_results.load(Ordering::Relaxed),
            segments_emitted: self.segments_emitted.load(Ordering::Relaxed),
            forced_cuts: self.forced_cuts.load(Ordering::Relaxed),
            dropped_short: self.dropped_short.load(Ordering::Relaxed),
        }
    }

    /// Add a finished job's counters to these totals.
    pub fn absorb(&self, job: &DiagnosticsSnapshot) {
        self.segments_detected
            .fetch_add(job.segments_detected, Ordering::Relaxed);
        self.recognizer_calls
            .fetch_add(job.recognizer_calls, Ordering::Relaxed);
        self.recognizer_errors
            .fetch_add(job.recognizer_errors, Ordering::Relaxed);
        self.empty_results
            .fetch_add(job.empty_results, Ordering::Relaxed);
        self.segments_emitted
            .fetch_add(job.segments_emitted, Ordering::Relaxed);
        self.forced_cuts.fetch_add(job.forced_cuts, Ordering::Relaxed);
        self.dropped_short
            .fetch_add(job.dropped_short, Ordering::Relaxed);
    }

    /// Record what the streaming segmenter cut or dropped.
    pub fn record_segmenter(&self, stats: &SegmenterStats) {
        self.forced_cuts
            .fetch_add(stats.forced_cuts, Ordering::Relaxed);
        self.dropped_short
            .fetch_add(stats.dropped_short, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub segments_detected: usize,
    pub recognizer_calls: usize,
    pub recognizer_errors: usize,
    pub empty_results: usize,
    pub segments_emitted: usize,
    pub forced_cuts: usize,
    pub dropped_short: usize,
}

impl DiagnosticsSnapshot {
    /// Segments that reached the recognizer but produced no text.
    pub fn dropped_segments(&self) -> usize {
        self.recognizer_errors + self.empty_results
    }
}

/// Recognise every segment in order and assemble the transcript.
///
/// # Errors
/// Only `CuttleError::Cancelled`. Recognizer failures are recovered per
/// segment.
pub fn stitch<I>(
    segments: I,
    recognizer: &RecognizerHandle,
    sample_rate: u32,
    cancel: &AtomicBool,
    diagnostics: &PipelineDiagnostics,
    progress: Option<&broadcast::Sender<TranscriptProgress>>,
) -> Result<Transcript>
where
    I: IntoIterator<Item = SpeechSegment>,
{
    let mut stitched: Vec<TimedText> = Vec::new();

    for segment in segments {
        if cancel.load(Ordering::Relaxed) {
            info!(
                completed = stitched.len(),
                "transcription cancelled between segments"
            );
            return Err(CuttleError::Cancelled);
        }
        diagnostics.segments_detected.fetch_add(1, Ordering::Relaxed);

        let start_seconds = segment.start_secs(sample_rate);
        let end_seconds = start_seconds + segment.duration_secs(sample_rate);

        diagnostics.recognizer_calls.fetch_add(1, Ordering::Relaxed);
        let result = recognizer.0.lock().recognize(&segment.samples, sample_rate);

        let recognition = match result {
            Ok(r) => r,
            Err(e) => {
                diagnostics.recognizer_errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    error = %e,
                    start_seconds,
                    end_seconds,
                    "recognizer failed on segment; dropping it"
                );
                continue;
            }
        };

        if recognition.is_blank() {
            diagnostics.empty_results.fetch_add(1, Ordering::Relaxed);
            debug!(start_seconds, end_seconds, "empty recognition; segment dropped");
            continue;
        }

        let timed = TimedText {
            text: recognition.text.trim().to_string(),
            start_seconds,
            end_seconds,
            confidence: recognition.confidence,
        };
        debug!(
            start_seconds,
            end_seconds,
            chars = timed.text.len(),
            "segment stitched"
        );

        if let Some(tx) = progress {
            // No subscribers is fine.
            let _ = tx.send(TranscriptProgress::Segment {
                index: stitched.len(),
                segment: timed.clone(),
            });
        }
        diagnostics.segments_emitted.fetch_add(1, Ordering::Relaxed);
        stitched.push(timed);
    }

    Ok(Transcript::from_segments(stitched))
}
