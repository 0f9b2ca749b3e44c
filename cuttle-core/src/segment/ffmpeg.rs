//! `FfmpegSilenceDetector`: whole-file silence analysis via the `ffmpeg`
//! `silencedetect` filter.
//!
//! Runs `ffmpeg -i <file> -af silencedetect=noise=<db>dB:d=<secs> -f null -`
//! and parses the filter's report from stderr:
//!
//! ```text
//!   Duration: 00:01:40.02, start: 0.000000, bitrate: 256 kb/s
//! [silencedetect @ 0x5581] silence_start: 29.4
//! [silencedetect @ 0x5581] silence_end: 30.1 | silence_duration: 0.7
//! ```

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::error::{CuttleError, Result};
use crate::segment::silence::{SilenceDetector, SilenceInterval};

#[derive(Debug, Clone)]
pub struct FfmpegSilenceDetector {
    ffmpeg: PathBuf,
}

impl FfmpegSilenceDetector {
    /// Use `ffmpeg` from `PATH`.
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    pub fn with_binary(path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: path.into(),
        }
    }
}

impl Default for FfmpegSilenceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl SilenceDetector for FfmpegSilenceDetector {
    fn detect_silence(
        &self,
        path: &Path,
        threshold_db: f64,
        min_duration: f64,
    ) -> Result<Vec<SilenceInterval>> {
        let filter = format!("silencedetect=noise={threshold_db}dB:d={min_duration}");
        debug!(ffmpeg = %self.ffmpeg.display(), %filter, "running silence detection");

        let output = Command::new(&self.ffmpeg)
            .arg("-hide_banner")
            .arg("-nostats")
            .arg("-i")
            .arg(path)
            .arg("-af")
            .arg(&filter)
            .arg("-f")
            .arg("null")
            .arg("-")
            .output()
            .map_err(|e| {
                CuttleError::SilenceDetection(format!("spawn {}: {e}", self.ffmpeg.display()))
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            let tail: String = stderr.lines().rev().take(3).collect::<Vec<_>>().join(" | ");
            return Err(CuttleError::SilenceDetection(format!(
                "ffmpeg exited with {}: {tail}",
                output.status
            )));
        }

        let silences = parse_silencedetect(&stderr);
        info!(
            path = %path.display(),
            silences = silences.len(),
            "silence detection finished"
        );
        Ok(silences)
    }
}

/// Parse `silencedetect` stderr. A trailing start without an end closes at
/// the reported input duration, or is dropped when none was reported.
pub fn parse_silencedetect(stderr: &str) -> Vec<SilenceInterval> {
    let mut silences = Vec::new();
    let mut open: Option<f64> = None;
    let mut duration: Option<f64> = None;

    for line in stderr.lines() {
        if duration.is_none() {
            if let Some(rest) = line.trim_start().strip_prefix("Duration:") {
                duration = rest.split(',').next().and_then(parse_timestamp);
            }
        }
        if let Some(start) = value_after(line, "silence_start:") {
            open = Some(start);
        } else if let Some(end) = value_after(line, "silence_end:") {
            if let Some(start) = open.take() {
                silences.push(SilenceInterval::new(start.max(0.0), end));
            }
        }
    }

    if let (Some(start), Some(end)) = (open, duration) {
        if end > start {
            silences.push(SilenceInterval::new(start.max(0.0), end));
        }
    }
    silences
}

fn value_after(line: &str, key: &str) -> Option<f64> {
    let idx = line.find(key)?;
    line[idx + key.len()..]
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}

/// `HH:MM:SS.ss` to seconds.
fn parse_timestamp(raw: &str) -> Option<f64> {
    let mut secs = 0.0;
    for part in raw.trim().split(':') {
        secs = secs * 60.0 + part.parse::<f64>().ok()?;
    }
    Some(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Input #0, wav, from 'talk.wav':
  Duration: 00:01:40.50, bitrate: 256 kb/s
[silencedetect @ 0x55d1] silence_start: 29.4
[silencedetect @ 0x55d1] silence_end: 30.1 | silence_duration: 0.7
[silencedetect @ 0x55d1] silence_start: -0.01
[silencedetect @ 0x55d1] silence_end: 0.5 | silence_duration: 0.51
[silencedetect @ 0x55d1] silence_start: 98.2
size=N/A time=00:01:40.50 bitrate=N/A speed= 900x
";

    #[test]
    fn parses_pairs_and_trailing_silence() {
        let silences = parse_silencedetect(SAMPLE);
        assert_eq!(silences.len(), 3);
        assert_eq!(silences[0], SilenceInterval::new(29.4, 30.1));
        assert_eq!(silences[1], SilenceInterval::new(0.0, 0.5));
        assert_eq!(silences[2], SilenceInterval::new(98.2, 100.5));
    }

    #[test]
    fn dangling_start_without_duration_is_dropped() {
        let silences = parse_silencedetect("[silencedetect @ 0x1] silence_start: 3.0\n");
        assert!(silences.is_empty());
    }

    #[test]
    fn timestamp_parsing() {
        assert_eq!(parse_timestamp("00:00:05.5"), Some(5.5));
        assert_eq!(parse_timestamp("01:02:03"), Some(3723.0));
        assert_eq!(parse_timestamp("N/A"), None);
    }

    #[test]
    fn missing_binary_is_silence_detection_error() {
        let detector = FfmpegSilenceDetector::with_binary("/nonexistent/ffmpeg-binary");
        let err = detector
            .detect_silence(Path::new("x.wav"), -30.0, 0.3)
            .unwrap_err();
        assert!(matches!(err, CuttleError::SilenceDetection(_)));
    }
}
