//! Stitched transcript values.
//!
//! Both types serialise with camelCase keys so reports and progress events
//! read the same in every consumer.

pub mod events;

pub use events::TranscriptProgress;

use serde::{Deserialize, Serialize};

/// Recognised text for one segment, placed on the job's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedText {
    pub text: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
    /// Model confidence in [0.0, 1.0], if the engine reports one.
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl TimedText {
    pub fn duration_seconds(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }
}

/// Full result of one transcription job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub full_text: String,
    pub segments: Vec<TimedText>,
}

impl Transcript {
    /// Assemble a transcript; `full_text` is the space-joined segment texts.
    pub fn from_segments(segments: Vec<TimedText>) -> Self {
        let full_text = segments
            .iter()
            .map(|s| s.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string();
        Self {
            full_text,
            segments,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// End time of the last segment, or 0 for an empty transcript.
    pub fn end_seconds(&self) -> f64 {
        self.segments.last().map_or(0.0, |s| s.end_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timed(text: &str, start: f64, end: f64) -> TimedText {
        TimedText {
            text: text.into(),
            start_seconds: start,
            end_seconds: end,
            confidence: None,
        }
    }

    #[test]
    fn full_text_joins_with_single_spaces() {
        let t = Transcript::from_segments(vec![
            timed("hello there", 0.0, 1.0),
            timed("general", 1.5, 2.0),
        ]);
        assert_eq!(t.full_text, "hello there general");
        assert_eq!(t.end_seconds(), 2.0);
    }

    #[test]
    fn empty_transcript_has_empty_text() {
        let t = Transcript::from_segments(Vec::new());
        assert!(t.is_empty());
        assert_eq!(t.full_text, "");
        assert_eq!(t.end_seconds(), 0.0);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let t = Transcript::from_segments(vec![TimedText {
            confidence: Some(0.5),
            ..timed("hi", 0.25, 0.75)
        }]);
        let json = serde_json::to_value(&t).expect("serialize transcript");
        assert_eq!(json["fullText"], "hi");
        assert_eq!(json["segments"][0]["startSeconds"], 0.25);
        assert_eq!(json["segments"][0]["endSeconds"], 0.75);
        assert_eq!(json["segments"][0]["confidence"], 0.5);

        let back: Transcript = serde_json::from_value(json).expect("deserialize transcript");
        assert_eq!(back, t);
    }
}
