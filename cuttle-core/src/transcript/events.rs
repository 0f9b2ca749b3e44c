//! Progress events broadcast while a job runs.
//!
//! Subscribe with [`crate::Transcriber::subscribe_progress`]. Every stitched
//! segment produces one `Segment` event in timeline order; a job that runs to
//! the end finishes with exactly one `Completed`.

use serde::{Deserialize, Serialize};

use crate::engine::pipeline::DiagnosticsSnapshot;
use crate::transcript::TimedText;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TranscriptProgress {
    /// A segment was recognised and appended to the transcript.
    #[serde(rename_all = "camelCase")]
    Segment {
        /// Position of the segment in the transcript (0-based).
        index: usize,
        segment: TimedText,
    },
    /// The job finished; no more events follow for it.
    #[serde(rename_all = "camelCase")]
    Completed {
        segment_count: usize,
        diagnostics: DiagnosticsSnapshot,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_event_is_tagged() {
        let event = TranscriptProgress::Segment {
            index: 3,
            segment: TimedText {
                text: "hello".into(),
                start_seconds: 1.0,
                end_seconds: 2.0,
                confidence: None,
            },
        };
        let json = serde_json::to_value(&event).expect("serialize progress event");
        assert_eq!(json["kind"], "segment");
        assert_eq!(json["index"], 3);
        assert_eq!(json["segment"]["text"], "hello");
    }

    #[test]
    fn completed_event_carries_counters() {
        let event = TranscriptProgress::Completed {
            segment_count: 2,
            diagnostics: DiagnosticsSnapshot {
                recognizer_calls: 3,
                recognizer_errors: 1,
                ..DiagnosticsSnapshot::default()
            },
        };
        let json = serde_json::to_value(&event).expect("serialize progress event");
        assert_eq!(json["kind"], "completed");
        assert_eq!(json["segmentCount"], 2);
        assert_eq!(json["diagnostics"]["recognizerErrors"], 1);

        let back: TranscriptProgress =
            serde_json::from_value(json).expect("deserialize progress event");
        assert_eq!(back, event);
    }
}
