//! Streaming voice-activity segmenter.
//!
//! ## State machine
//!
//! ```text
//!            speech frame                      silence_run >= min_silence
//!   Idle ───────────────────► Accumulating ──────────────────────────────► emit ─► Idle
//!                              │        ▲
//!                              └────────┘ length > max_speech: cut at start + max,
//!                                         emit, keep accumulating from the cut
//! ```
//!
//! Callers push windows with [`VadSegmenter::accept_waveform`], then drain
//! finished segments with [`VadSegmenter::front`] / [`VadSegmenter::pop`]
//! before pushing more. [`VadSegmenter::flush`] closes whatever is still open
//! at end of stream.
//!
//! Audio lives in a [`SampleRing`] sized from `buffer_horizon_seconds`; only
//! samples from the start of the open segment onward are retained, so memory
//! is bounded no matter how long the input is.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::buffering::chunk::{samples_to_secs, secs_to_samples};
use crate::buffering::SampleRing;
use crate::error::{CuttleError, Result};
use crate::segment::SpeechSegment;
use crate::vad::{VadDecision, VoiceActivityDetector};

/// Streaming segmenter configuration. Fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct SegmenterConfig {
    /// Speech probability cutoff in [0, 1].
    pub threshold: f32,
    /// Silence (seconds) needed to close a segment.
    pub min_silence_duration: f64,
    /// Shortest segment (seconds) kept; shorter ones are dropped.
    pub min_speech_duration: f64,
    /// Hard cap (seconds) that force-cuts a segment without silence.
    /// Must not exceed the recognizer's window.
    pub max_speech_duration: f64,
    pub sample_rate: u32,
    /// Seconds of audio the internal ring buffer can hold.
    pub buffer_horizon_seconds: f64,
    /// Samples per classifier frame.
    pub window_size: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_silence_duration: 0.5,
            min_speech_duration: 0.25,
            max_speech_duration: 20.0,
            sample_rate: 16_000,
            buffer_horizon_seconds: 60.0,
            window_size: 512,
        }
    }
}

impl SegmenterConfig {
    pub fn min_silence_frames(&self) -> usize {
        let samples = secs_to_samples(self.min_silence_duration, self.sample_rate);
        samples.div_ceil(self.window_size.max(1)).max(1)
    }

    pub fn min_speech_samples(&self) -> usize {
        secs_to_samples(self.min_speech_duration, self.sample_rate)
    }

    pub fn max_speech_samples(&self) -> usize {
        secs_to_samples(self.max_speech_duration, self.sample_rate)
    }

    pub fn horizon_samples(&self) -> usize {
        secs_to_samples(self.buffer_horizon_seconds, self.sample_rate)
    }

    /// Worst-case samples retained while a segment is open: a full-length
    /// segment, a silence run one frame short of closing it, and one frame
    /// of slack on each side.
    fn required_horizon_samples(&self) -> usize {
        self.max_speech_samples() + self.min_silence_frames() * self.window_size + 2 * self.window_size
    }

    /// Reject inconsistent settings. Nothing is clamped.
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(CuttleError::Config(msg));

        if !(0.0..=1.0).contains(&self.threshold) {
            return bad(format!("threshold {} outside [0, 1]", self.threshold));
        }
        if self.sample_rate == 0 {
            return bad("sample_rate must be positive".into());
        }
        if self.window_size == 0 {
            return bad("window_size must be positive".into());
        }
        for (name, value) in [
            ("min_silence_duration", self.min_silence_duration),
            ("max_speech_duration", self.max_speech_duration),
            ("buffer_horizon_seconds", self.buffer_horizon_seconds),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return bad(format!("{name} must be a positive number, got {value}"));
            }
        }
        if !self.min_speech_duration.is_finite() || self.min_speech_duration < 0.0 {
            return bad(format!(
                "min_speech_duration must be non-negative, got {}",
                self.min_speech_duration
            ));
        }
        if self.min_speech_duration > self.max_speech_duration {
            return bad(format!(
                "min_speech_duration {}s exceeds max_speech_duration {}s",
                self.min_speech_duration, self.max_speech_duration
            ));
        }
        if self.max_speech_samples() == 0 {
            return bad("max_speech_duration is shorter than one sample".into());
        }
        let required = self.required_horizon_samples();
        if self.horizon_samples() < required {
            return bad(format!(
                "buffer_horizon_seconds {} too small, need at least {:.2}s",
                self.buffer_horizon_seconds,
                samples_to_secs(required, self.sample_rate)
            ));
        }
        Ok(())
    }
}

/// Counters describing one segmenter run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmenterStats {
    pub frames: usize,
    pub speech_frames: usize,
    pub detector_errors: usize,
    pub segments_emitted: usize,
    pub forced_cuts: usize,
    pub dropped_short: usize,
    pub evicted_samples: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmenterState {
    Idle,
    Accumulating {
        /// Absolute start of the open segment.
        start: usize,
        /// Absolute end of the last speech frame.
        speech_end: usize,
        speech_run: usize,
        silence_run: usize,
        /// Opened by a forced cut; kept regardless of `min_speech_duration`.
        continued: bool,
    },
}

/// Incremental VAD-driven segmenter with a bounded sample horizon.
pub struct VadSegmenter {
    config: SegmenterConfig,
    detector: Box<dyn VoiceActivityDetector>,
    ring: SampleRing,
    /// Samples of the frame currently being filled.
    frame: Vec<f32>,
    /// Absolute index of the next frame's first sample.
    classified: usize,
    state: SegmenterState,
    ready: VecDeque<SpeechSegment>,
    stats: SegmenterStats,
    min_silence_frames: usize,
    min_speech_samples: usize,
    max_speech_samples: usize,
}

impl VadSegmenter {
    /// Build a segmenter. Configuration errors surface here, never at
    /// stream time.
    pub fn new<D: VoiceActivityDetector>(config: SegmenterConfig, detector: D) -> Result<Self> {
        config.validate()?;
        if let Some(required) = detector.required_frame_size() {
            if required != config.window_size {
                return Err(CuttleError::Config(format!(
                    "detector requires {required}-sample frames but window_size is {}",
                    config.window_size
                )));
            }
        }

        debug!(
            window = config.window_size,
            min_silence_frames = config.min_silence_frames(),
            max_speech_samples = config.max_speech_samples(),
            horizon_samples = config.horizon_samples(),
            "vad segmenter ready"
        );

        Ok(Self {
            ring: SampleRing::new(config.horizon_samples()),
            frame: Vec::with_capacity(config.window_size),
            classified: 0,
            state: SegmenterState::Idle,
            ready: VecDeque::new(),
            stats: SegmenterStats::default(),
            min_silence_frames: config.min_silence_frames(),
            min_speech_samples: config.min_speech_samples(),
            max_speech_samples: config.max_speech_samples(),
            detector: Box::new(detector),
            config,
        })
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    pub fn stats(&self) -> SegmenterStats {
        self.stats
    }

    /// Samples currently retained in the ring buffer.
    pub fn buffered_samples(&self) -> usize {
        self.ring.len()
    }

    /// True while a segment is open.
    pub fn is_speech_active(&self) -> bool {
        matches!(self.state, SegmenterState::Accumulating { .. })
    }

    /// Push samples in stream order. Any length is accepted; partial frames
    /// wait for more input.
    pub fn accept_waveform(&mut self, samples: &[f32]) {
        let window = self.config.window_size;
        let mut rest = samples;
        while !rest.is_empty() {
            let take = (window - self.frame.len()).min(rest.len());
            let (head, tail) = rest.split_at(take);
            self.store(head);
            self.frame.extend_from_slice(head);
            rest = tail;

            if self.frame.len() == window {
                self.process_frame(window);
                self.frame.clear();
            }
        }
    }

    /// Next finished segment, if any.
    pub fn front(&self) -> Option<&SpeechSegment> {
        self.ready.front()
    }

    pub fn pop(&mut self) -> Option<SpeechSegment> {
        self.ready.pop_front()
    }

    /// True when no finished segment is waiting.
    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }

    /// End of stream: classify the trailing partial frame and emit any open
    /// segment without waiting for silence.
    pub fn flush(&mut self) {
        if !self.frame.is_empty() {
            let real_len = self.frame.len();
            if self.detector.required_frame_size().is_some() {
                self.frame.resize(self.config.window_size, 0.0);
            }
            self.process_frame(real_len);
            self.frame.clear();
        }

        if let SegmenterState::Accumulating {
            start,
            speech_end,
            continued,
            ..
        } = self.state
        {
            debug!(start, speech_end, "flush closing open segment");
            self.close_segment(start, speech_end, continued);
        }
        self.state = SegmenterState::Idle;
        self.ring.discard_before(self.classified);
        self.detector.reset();
    }

    /// Forget all audio, state and queued segments.
    pub fn reset(&mut self) {
        self.ring.clear();
        self.frame.clear();
        self.classified = 0;
        self.state = SegmenterState::Idle;
        self.ready.clear();
        self.stats = SegmenterStats::default();
        self.detector.reset();
    }

    fn store(&mut self, samples: &[f32]) {
        let evicted = self.ring.push(samples);
        if evicted == 0 {
            return;
        }
        self.stats.evicted_samples += evicted;
        warn!(evicted, "segmenter horizon overflow; oldest audio dropped");
        if let SegmenterState::Accumulating { start, .. } = &mut self.state {
            *start = (*start).max(self.ring.base());
        }
    }

    fn process_frame(&mut self, real_len: usize) {
        let frame_start = self.classified;
        let frame_end = frame_start + real_len;
        self.classified = frame_end;
        self.stats.frames += 1;

        let probability = match self.detector.speech_probability(&self.frame) {
            Ok(p) => p,
            Err(e) => {
                self.stats.detector_errors += 1;
                warn!(error = %e, frame_start, "vad frame failed; treating as silence");
                0.0
            }
        };
        let decision = VadDecision::from_probability(probability, self.config.threshold);
        if decision.is_speech() {
            self.stats.speech_frames += 1;
        }

        self.state = match (self.state, decision) {
            (SegmenterState::Idle, VadDecision::Speech) => SegmenterState::Accumulating {
                start: frame_start,
                speech_end: frame_end,
                speech_run: 1,
                silence_run: 0,
                continued: false,
            },
            (SegmenterState::Idle, VadDecision::Silence) => {
                self.ring.discard_before(frame_end);
                SegmenterState::Idle
            }
            (
                SegmenterState::Accumulating {
                    start,
                    speech_run,
                    continued,
                    ..
                },
                VadDecision::Speech,
            ) => self.enforce_max(start, frame_end, speech_run + 1, continued),
            (
                SegmenterState::Accumulating {
                    start,
                    speech_end,
                    speech_run,
                    silence_run,
                    continued,
                },
                VadDecision::Silence,
            ) => {
                let silence_run = silence_run + 1;
                if silence_run >= self.min_silence_frames {
                    self.close_segment(start, speech_end, continued);
                    self.ring.discard_before(frame_end);
                    SegmenterState::Idle
                } else {
                    SegmenterState::Accumulating {
                        start,
                        speech_end,
                        speech_run,
                        silence_run,
                        continued,
                    }
                }
            }
        };
    }

    /// Cut the open segment at `start + max` as often as needed, re-opening
    /// accumulation at each cut point. The remainder of a cut utterance is
    /// never dropped as too short.
    fn enforce_max(
        &mut self,
        mut start: usize,
        speech_end: usize,
        speech_run: usize,
        mut continued: bool,
    ) -> SegmenterState {
        while speech_end - start > self.max_speech_samples {
            let cut = start + self.max_speech_samples;
            self.stats.forced_cuts += 1;
            debug!(start, cut, "max speech duration reached; forcing cut");
            self.emit(start, cut);
            self.ring.discard_before(cut);
            start = cut;
            continued = true;
        }
        SegmenterState::Accumulating {
            start,
            speech_end,
            speech_run,
            silence_run: 0,
            continued,
        }
    }

    fn close_segment(&mut self, start: usize, end: usize, continued: bool) {
        let len = end.saturating_sub(start);
        if len == 0 || (len < self.min_speech_samples && !continued) {
            self.stats.dropped_short += 1;
            debug!(start, len, "segment shorter than min speech; dropped");
            return;
        }
        self.emit(start, end);
    }

    fn emit(&mut self, start: usize, end: usize) {
        let start = start.max(self.ring.base());
        let samples = self.ring.copy_range(start, end);
        if samples.is_empty() {
            return;
        }
        self.stats.segments_emitted += 1;
        debug!(
            start,
            end,
            secs = samples_to_secs(samples.len(), self.config.sample_rate),
            "segment ready"
        );
        self.ready.push_back(SpeechSegment::new(samples, start));
    }
}
