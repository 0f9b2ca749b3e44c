//! Offline silence-point chooser.
//!
//! For engines without a native VAD: analyse the whole file for silences
//! once, then place cut points inside the silences closest to a fixed target
//! spacing.
//!
//! ## Algorithm
//!
//! ```text
//! pos = 0
//! while pos + max_chunk < duration:
//!     target = pos + max_chunk
//!     window = (pos + max_chunk * lower_bound_factor, target + tolerance)
//!     cut    = silence midpoint in window closest to target, else target
//!     pos    = cut
//! ```
//!
//! The lower bound keeps chunks from becoming pathologically short; the
//! tolerance lets a cut overshoot the target slightly to land in silence
//! instead of mid-word. Both are plain tunables.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buffering::chunk::{samples_to_secs, secs_to_samples, AudioChunk};
use crate::error::{CuttleError, Result};
use crate::segment::SpeechSegment;
use crate::vad::EnergyVad;

/// One detected silence, in seconds from the start of the file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SilenceInterval {
    pub start: f64,
    pub end: f64,
}

impl SilenceInterval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn midpoint(&self) -> f64 {
        (self.start + self.end) / 2.0
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Whole-file silence analysis.
pub trait SilenceDetector: Send + Sync {
    /// Silences at least `min_duration` seconds long and quieter than
    /// `threshold_db` dBFS, in ascending order.
    fn detect_silence(
        &self,
        path: &Path,
        threshold_db: f64,
        min_duration: f64,
    ) -> Result<Vec<SilenceInterval>>;
}

/// Chooser configuration. Every constant here is a tunable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct ChooserConfig {
    /// Target spacing between cuts (seconds).
    pub max_chunk_duration: f64,
    /// Fraction of `max_chunk_duration` before which no cut is considered.
    pub lower_bound_factor: f64,
    /// How far past the target (seconds) a silence may lie and still win.
    pub tolerance: f64,
    /// Silence loudness ceiling in dBFS.
    pub silence_threshold_db: f64,
    /// Shortest silence (seconds) worth cutting in.
    pub min_silence_duration: f64,
}

impl Default for ChooserConfig {
    fn default() -> Self {
        Self {
            max_chunk_duration: 30.0,
            lower_bound_factor: 0.5,
            tolerance: 10.0,
            silence_threshold_db: -30.0,
            min_silence_duration: 0.3,
        }
    }
}

impl ChooserConfig {
    /// Longest chunk the chooser can produce.
    pub fn max_produced_chunk(&self) -> f64 {
        self.max_chunk_duration + self.tolerance
    }

    pub fn validate(&self) -> Result<()> {
        if !self.max_chunk_duration.is_finite() || self.max_chunk_duration <= 0.0 {
            return Err(CuttleError::Config(format!(
                "max_chunk_duration must be positive, got {}",
                self.max_chunk_duration
            )));
        }
        if !(0.0..1.0).contains(&self.lower_bound_factor) {
            return Err(CuttleError::Config(format!(
                "lower_bound_factor {} outside [0, 1)",
                self.lower_bound_factor
            )));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(CuttleError::Config(format!(
                "tolerance must be non-negative, got {}",
                self.tolerance
            )));
        }
        if self.min_silence_duration < 0.0 || self.silence_threshold_db > 0.0 {
            return Err(CuttleError::Config(
                "silence detection needs min duration >= 0 and threshold <= 0 dB".into(),
            ));
        }
        Ok(())
    }
}

/// Plans cut points over a known-duration file.
#[derive(Debug, Clone)]
pub struct SilencePointChooser {
    config: ChooserConfig,
}

impl SilencePointChooser {
    pub fn new(config: ChooserConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChooserConfig {
        &self.config
    }

    /// Ordered cut timestamps. Empty when the whole file fits one chunk.
    pub fn choose_cut_points(&self, duration: f64, silences: &[SilenceInterval]) -> Vec<f64> {
        let max = self.config.max_chunk_duration;
        let mut cuts = Vec::new();
        let mut position = 0.0;

        while position + max < duration {
            let target = position + max;
            let lower = position + max * self.config.lower_bound_factor;
            let upper = target + self.config.tolerance;

            let best = silences
                .iter()
                .map(SilenceInterval::midpoint)
                .filter(|&m| m > lower && m < upper && m < duration)
                .min_by(|a, b| (a - target).abs().total_cmp(&(b - target).abs()));

            let cut = match best {
                Some(m) => m,
                None => {
                    debug!(target, "no silence near target; cutting mid-speech");
                    target
                }
            };
            cuts.push(cut);
            position = cut;
        }

        debug!(duration, cuts = cuts.len(), "cut points chosen");
        cuts
    }
}

/// Extract `[0, c1), [c1, c2), …, [cN, end)` as segments. Empty ranges are
/// skipped.
pub fn split_at_cuts(chunk: &AudioChunk, cuts: &[f64]) -> Vec<SpeechSegment> {
    let len = chunk.len();
    let mut bounds = Vec::with_capacity(cuts.len() + 2);
    bounds.push(0usize);
    for &cut in cuts {
        let b = secs_to_samples(cut, chunk.sample_rate).min(len);
        let prev = bounds.last().copied().unwrap_or(0);
        bounds.push(b.max(prev));
    }
    bounds.push(len);

    bounds
        .windows(2)
        .filter(|w| w[1] > w[0])
        .map(|w| SpeechSegment::new(chunk.range(w[0]..w[1]).to_vec(), w[0]))
        .collect()
}

/// Frame length for in-process silence analysis.
const ANALYSIS_FRAME_SECS: f64 = 0.01;

/// In-process equivalent of a silence-detect pass over decoded samples:
/// 10 ms RMS frames quieter than `threshold_db` dBFS, merged into runs of at
/// least `min_duration` seconds.
pub fn detect_silence_in_samples(
    chunk: &AudioChunk,
    threshold_db: f64,
    min_duration: f64,
) -> Vec<SilenceInterval> {
    let frame = secs_to_samples(ANALYSIS_FRAME_SECS, chunk.sample_rate).max(1);
    let rate = chunk.sample_rate;
    let mut out = Vec::new();
    let mut run_start: Option<usize> = None;

    let close = |start: usize, end: usize, out: &mut Vec<SilenceInterval>| {
        let interval = SilenceInterval::new(samples_to_secs(start, rate), samples_to_secs(end, rate));
        if interval.duration() >= min_duration {
            out.push(interval);
        }
    };

    for (i, samples) in chunk.samples.chunks(frame).enumerate() {
        let rms = EnergyVad::rms(samples).max(1e-10);
        let db = 20.0 * f64::from(rms).log10();
        let offset = i * frame;
        match (db < threshold_db, run_start) {
            (true, None) => run_start = Some(offset),
            (false, Some(start)) => {
                close(start, offset, &mut out);
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        close(start, chunk.len(), &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn chooser() -> SilencePointChooser {
        SilencePointChooser::new(ChooserConfig::default()).unwrap()
    }

    #[test]
    fn short_file_has_no_cuts() {
        assert!(chooser().choose_cut_points(25.0, &[]).is_empty());
        assert!(chooser().choose_cut_points(30.0, &[]).is_empty());
    }

    #[test]
    fn falls_back_to_target_without_silences() {
        let cuts = chooser().choose_cut_points(100.0, &[]);
        assert_eq!(cuts, vec![30.0, 60.0, 90.0]);
    }

    #[test]
    fn picks_silence_closest_to_target() {
        let silences = [
            SilenceInterval::new(27.0, 28.0),
            SilenceInterval::new(36.0, 37.0),
        ];
        let cuts = chooser().choose_cut_points(50.0, &silences);
        assert_eq!(cuts.len(), 1);
        assert_relative_eq!(cuts[0], 27.5);
    }

    #[test]
    fn ignores_silence_below_lower_bound() {
        let silences = [SilenceInterval::new(9.5, 10.5)];
        let cuts = chooser().choose_cut_points(50.0, &silences);
        assert_eq!(cuts, vec![30.0]);
    }

    #[test]
    fn overshoots_within_tolerance() {
        let silences = [SilenceInterval::new(32.5, 33.5)];
        let cuts = chooser().choose_cut_points(50.0, &silences);
        assert_eq!(cuts, vec![33.0]);
    }

    #[test]
    fn silence_beyond_tolerance_is_ignored() {
        let silences = [SilenceInterval::new(41.0, 42.0)];
        let cuts = chooser().choose_cut_points(60.0, &silences);
        assert_eq!(cuts, vec![30.0]);
    }

    #[test]
    fn spacing_restarts_from_chosen_cut() {
        let silences = [
            SilenceInterval::new(28.0, 29.0),
            SilenceInterval::new(57.0, 58.0),
        ];
        let cuts = chooser().choose_cut_points(80.0, &silences);
        assert_eq!(cuts, vec![28.5, 57.5]);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = ChooserConfig {
            lower_bound_factor: 1.0,
            ..ChooserConfig::default()
        };
        assert!(SilencePointChooser::new(cfg).is_err());
        let cfg = ChooserConfig {
            max_chunk_duration: 0.0,
            ..ChooserConfig::default()
        };
        assert!(SilencePointChooser::new(cfg).is_err());
    }

    #[test]
    fn split_covers_whole_buffer() {
        let chunk = AudioChunk::new(vec![0.1; 16_000 * 10], 16_000);
        let segments = split_at_cuts(&chunk, &[2.5, 7.0]);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].start_sample, 0);
        assert_eq!(segments[1].start_sample, 40_000);
        assert_eq!(segments[2].start_sample, 112_000);
        assert_eq!(segments[2].end_sample(), chunk.len());
        let total: usize = segments.iter().map(|s| s.len()).sum();
        assert_eq!(total, chunk.len());
    }

    #[test]
    fn split_without_cuts_is_whole_file() {
        let chunk = AudioChunk::new(vec![0.1; 800], 16_000);
        let segments = split_at_cuts(&chunk, &[]);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].len(), 800);
    }

    #[test]
    fn detects_quiet_gap() {
        let mut samples = vec![0.2f32; 16_000];
        samples.extend(vec![0.0f32; 8_000]);
        samples.extend(vec![0.2f32; 16_000]);
        let chunk = AudioChunk::new(samples, 16_000);

        let silences = detect_silence_in_samples(&chunk, -30.0, 0.3);
        assert_eq!(silences.len(), 1);
        assert_relative_eq!(silences[0].start, 1.0, epsilon = 0.011);
        assert_relative_eq!(silences[0].end, 1.5, epsilon = 0.011);
    }

    #[test]
    fn short_gaps_are_not_silences() {
        let mut samples = vec![0.2f32; 16_000];
        samples.extend(vec![0.0f32; 1_600]);
        samples.extend(vec![0.2f32; 16_000]);
        let chunk = AudioChunk::new(samples, 16_000);
        assert!(detect_silence_in_samples(&chunk, -30.0, 0.3).is_empty());
    }
}
