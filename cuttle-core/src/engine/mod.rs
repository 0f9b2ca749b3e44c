//! `Transcriber`: top-level job driver.
//!
//! ## Job flow
//!
//! ```text
//! Transcriber::new(config, recognizer)   → config validated against the
//!     │                                     recognizer window
//!     └─► warm_up()                      → engine loaded / server probed
//!         └─► transcribe_file(source, path, cancel)
//!               decode → segment (Streaming | SilenceCuts) → stitch
//!               → TranscriptProgress::Segment … Completed
//! ```
//!
//! Each job owns its decoded buffer, its segmenter and its transcript. The
//! recognizer is shared through `RecognizerHandle`, so one `Transcriber`
//! (or clones of it) can run several jobs at once.
//!
//! ## Threading
//!
//! Jobs are blocking. `transcribe_file_async` moves one onto
//! `tokio::task::spawn_blocking` so async callers keep their executor free.

pub mod pipeline;

use std::path::{Path, PathBuf};
use std::sync::{atomic::AtomicBool, Arc};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, info_span, warn};

use crate::{
    audio::PcmSource,
    buffering::chunk::AudioChunk,
    error::{CuttleError, Result},
    inference::RecognizerHandle,
    segment::{
        detect_silence_in_samples, split_at_cuts, ChooserConfig, FfmpegSilenceDetector,
        SegmenterConfig, SegmenterStats, SilenceDetector, SilenceInterval, SilencePointChooser,
        SpeechSegment, VadSegmenter,
    },
    transcript::{Transcript, TranscriptProgress},
    vad::{EnergyVad, VoiceActivityDetector},
};

use pipeline::{stitch, DiagnosticsSnapshot, PipelineDiagnostics};

/// Broadcast channel capacity: 256 progress events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// How a job cuts its audio into recognizer-sized segments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Strategy {
    /// Frame-level VAD, segments recognised as soon as they close.
    #[default]
    Streaming,
    /// Whole-file silence analysis, cuts placed in the silences.
    SilenceCuts,
}

/// Settings for the built-in energy detector used by `Strategy::Streaming`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct EnergyVadSettings {
    /// RMS level that scores exactly 0.5.
    pub reference_rms: f32,
    pub hangover_frames: u32,
}

impl Default for EnergyVadSettings {
    fn default() -> Self {
        Self {
            reference_rms: 0.02,
            hangover_frames: 0,
        }
    }
}

/// Configuration for `Transcriber`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct TranscriberConfig {
    /// Rate every buffer must be at before segmentation (Hz). Default: 16000.
    pub target_sample_rate: u32,
    pub strategy: Strategy,
    pub segmenter: SegmenterConfig,
    pub chooser: ChooserConfig,
    pub energy_vad: EnergyVadSettings,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16_000,
            strategy: Strategy::default(),
            segmenter: SegmenterConfig::default(),
            chooser: ChooserConfig::default(),
            energy_vad: EnergyVadSettings::default(),
        }
    }
}

impl TranscriberConfig {
    /// Read a JSON config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| CuttleError::Config(format!("{}: {e}", path.display())))
    }

    /// Check every sub-config plus the cross-field limits that depend on the
    /// recognizer's window (seconds).
    pub fn validate(&self, recognizer_window_secs: f64) -> Result<()> {
        if self.target_sample_rate == 0 {
            return Err(CuttleError::Config(
                "target_sample_rate must be positive".into(),
            ));
        }
        self.segmenter.validate()?;
        self.chooser.validate()?;

        if self.segmenter.sample_rate != self.target_sample_rate {
            return Err(CuttleError::Config(format!(
                "segmenter sample_rate {} does not match target_sample_rate {}",
                self.segmenter.sample_rate, self.target_sample_rate
            )));
        }
        let reference_rms = self.energy_vad.reference_rms;
        if reference_rms.is_nan() || reference_rms <= 0.0 {
            return Err(CuttleError::Config(format!(
                "energy reference_rms must be positive, got {}",
                self.energy_vad.reference_rms
            )));
        }

        match self.strategy {
            Strategy::Streaming if self.segmenter.max_speech_duration > recognizer_window_secs => {
                Err(CuttleError::Config(format!(
                    "max_speech_duration {}s exceeds the recognizer window of {}s",
                    self.segmenter.max_speech_duration, recognizer_window_secs
                )))
            }
            Strategy::SilenceCuts if self.chooser.max_produced_chunk() > recognizer_window_secs => {
                Err(CuttleError::Config(format!(
                    "max_chunk_duration + tolerance ({}s) exceeds the recognizer window of {}s",
                    self.chooser.max_produced_chunk(),
                    recognizer_window_secs
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Builds a fresh frame classifier for each streaming job.
pub type DetectorFactory =
    Arc<dyn Fn() -> Result<Box<dyn VoiceActivityDetector>> + Send + Sync + 'static>;

/// Long-form transcription driver. Cheap to clone; clones share the
/// recognizer, the progress channel and the diagnostics totals.
#[derive(Clone)]
pub struct Transcriber {
    config: TranscriberConfig,
    recognizer: RecognizerHandle,
    chooser: SilencePointChooser,
    silence_detector: Arc<dyn SilenceDetector>,
    detector_factory: DetectorFactory,
    progress_tx: broadcast::Sender<TranscriptProgress>,
    totals: Arc<PipelineDiagnostics>,
}

impl Transcriber {
    /// Build a transcriber. Configuration errors surface here, never
    /// mid-job.
    pub fn new(config: TranscriberConfig, recognizer: RecognizerHandle) -> Result<Self> {
        let window = recognizer.max_duration_secs();
        config.validate(window)?;

        let chooser = SilencePointChooser::new(config.chooser.clone())?;
        let energy = config.energy_vad.clone();
        let detector_factory: DetectorFactory = Arc::new(move || {
            Ok(Box::new(EnergyVad::new(energy.reference_rms, energy.hangover_frames))
                as Box<dyn VoiceActivityDetector>)
        });
        let (progress_tx, _) = broadcast::channel(BROADCAST_CAP);

        info!(
            recognizer = %recognizer.name(),
            window_secs = window,
            strategy = ?config.strategy,
            "transcriber ready"
        );

        Ok(Self {
            config,
            recognizer,
            chooser,
            silence_detector: Arc::new(FfmpegSilenceDetector::new()),
            detector_factory,
            progress_tx,
            totals: Arc::new(PipelineDiagnostics::default()),
        })
    }

    /// Replace the whole-file silence analyser (default: `ffmpeg`).
    pub fn with_silence_detector<S: SilenceDetector + 'static>(mut self, detector: S) -> Self {
        self.silence_detector = Arc::new(detector);
        self
    }

    /// Replace the streaming frame classifier (default: `EnergyVad`).
    pub fn with_detector_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn VoiceActivityDetector>> + Send + Sync + 'static,
    {
        self.detector_factory = Arc::new(factory);
        self
    }

    pub fn config(&self) -> &TranscriberConfig {
        &self.config
    }

    pub fn recognizer(&self) -> &RecognizerHandle {
        &self.recognizer
    }

    /// Warm up the recognizer. Call once before the first job.
    pub fn warm_up(&self) -> Result<()> {
        info!("warming up recognizer");
        self.recognizer.0.lock().warm_up()?;
        info!("recognizer ready");
        Ok(())
    }

    /// Subscribe to per-segment progress and job completion events.
    pub fn subscribe_progress(&self) -> broadcast::Receiver<TranscriptProgress> {
        self.progress_tx.subscribe()
    }

    /// Counters summed over every job this transcriber (and its clones) ran.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.totals.snapshot()
    }

    /// Transcribe an already-decoded buffer.
    ///
    /// # Errors
    /// - `CuttleError::Config` if the buffer is not at the target rate.
    /// - `CuttleError::Cancelled` if `cancel` is raised between segments.
    pub fn transcribe_chunk(&self, chunk: &AudioChunk, cancel: &AtomicBool) -> Result<Transcript> {
        self.check_rate(chunk.sample_rate)?;
        self.run_job(chunk, None, cancel)
    }

    /// Decode `path` through `source` and transcribe it.
    ///
    /// With `Strategy::SilenceCuts` the injected silence detector analyses the
    /// file itself; if it fails, silences are measured on the decoded samples
    /// instead.
    pub fn transcribe_file(
        &self,
        source: &dyn PcmSource,
        path: &Path,
        cancel: &AtomicBool,
    ) -> Result<Transcript> {
        self.check_rate(source.sample_rate())?;
        let decoded = source.decode(path)?;
        self.check_rate(decoded.chunk.sample_rate)?;

        let silences = match self.config.strategy {
            Strategy::Streaming => None,
            Strategy::SilenceCuts => {
                let cfg = self.chooser.config();
                match self.silence_detector.detect_silence(
                    path,
                    cfg.silence_threshold_db,
                    cfg.min_silence_duration,
                ) {
                    Ok(s) => Some(s),
                    Err(e) => {
                        warn!(
                            error = %e,
                            path = %path.display(),
                            "silence detector failed; analysing decoded samples"
                        );
                        None
                    }
                }
            }
        };

        self.run_job(&decoded.chunk, silences, cancel)
    }

    /// `transcribe_file` on the blocking pool.
    pub async fn transcribe_file_async(
        &self,
        source: Arc<dyn PcmSource>,
        path: PathBuf,
        cancel: Arc<AtomicBool>,
    ) -> Result<Transcript> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.transcribe_file(source.as_ref(), &path, &cancel))
            .await
            .map_err(|e| CuttleError::Other(anyhow::anyhow!("transcription task failed: {e}")))?
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn check_rate(&self, rate: u32) -> Result<()> {
        if rate != self.config.target_sample_rate {
            return Err(CuttleError::Config(format!(
                "audio is {rate} Hz but the transcriber expects {} Hz",
                self.config.target_sample_rate
            )));
        }
        Ok(())
    }

    fn run_job(
        &self,
        chunk: &AudioChunk,
        silences: Option<Vec<SilenceInterval>>,
        cancel: &AtomicBool,
    ) -> Result<Transcript> {
        let duration_seconds = chunk.duration_secs();
        let span = info_span!(
            "transcribe",
            strategy = ?self.config.strategy,
            duration_seconds
        );
        let _guard = span.enter();
        let started = Instant::now();
        let job = PipelineDiagnostics::default();

        let result = match self.config.strategy {
            Strategy::Streaming => {
                let detector = (self.detector_factory)()?;
                let segmenter = VadSegmenter::new(self.config.segmenter.clone(), detector)?;
                let mut segments = StreamingSegments::new(segmenter, &chunk.samples);
                let result = self.stitch_job(&mut segments, chunk.sample_rate, cancel, &job);
                job.record_segmenter(&segments.stats());
                result
            }
            Strategy::SilenceCuts => {
                let cfg = self.chooser.config();
                let silences = silences.unwrap_or_else(|| {
                    detect_silence_in_samples(
                        chunk,
                        cfg.silence_threshold_db,
                        cfg.min_silence_duration,
                    )
                });
                let cuts = self.chooser.choose_cut_points(duration_seconds, &silences);
                let segments = split_at_cuts(chunk, &cuts);
                self.stitch_job(segments, chunk.sample_rate, cancel, &job)
            }
        };

        let snapshot = job.snapshot();
        self.totals.absorb(&snapshot);
        let transcript = result?;

        let _ = self.progress_tx.send(TranscriptProgress::Completed {
            segment_count: transcript.segments.len(),
            diagnostics: snapshot,
        });

        let elapsed = started.elapsed().as_secs_f64();
        let rtf = if duration_seconds > 0.0 {
            elapsed / duration_seconds
        } else {
            0.0
        };
        info!(
            segments = transcript.segments.len(),
            dropped = snapshot.dropped_segments(),
            forced_cuts = snapshot.forced_cuts,
            elapsed_secs = elapsed,
            rtf,
            "transcription finished"
        );
        Ok(transcript)
    }

    fn stitch_job<I>(
        &self,
        segments: I,
        sample_rate: u32,
        cancel: &AtomicBool,
        job: &PipelineDiagnostics,
    ) -> Result<Transcript>
    where
        I: IntoIterator<Item = SpeechSegment>,
    {
        stitch(
            segments,
            &self.recognizer,
            sample_rate,
            cancel,
            job,
            Some(&self.progress_tx),
        )
    }
}

impl std::fmt::Debug for Transcriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcriber")
            .field("config", &self.config)
            .field("recognizer", &self.recognizer)
            .finish_non_exhaustive()
    }
}

/// Drives a `VadSegmenter` over a buffer in `window_size` pieces, yielding
/// each segment as soon as it closes.
struct StreamingSegments<'a> {
    segmenter: VadSegmenter,
    pieces: std::slice::Chunks<'a, f32>,
    flushed: bool,
}

impl<'a> StreamingSegments<'a> {
    fn new(segmenter: VadSegmenter, samples: &'a [f32]) -> Self {
        let window = segmenter.config().window_size;
        Self {
            pieces: samples.chunks(window),
            segmenter,
            flushed: false,
        }
    }

    fn stats(&self) -> SegmenterStats {
        self.segmenter.stats()
    }
}

impl Iterator for StreamingSegments<'_> {
    type Item = SpeechSegment;

    fn next(&mut self) -> Option<SpeechSegment> {
        loop {
            if let Some(segment) = self.segmenter.pop() {
                return Some(segment);
            }
            if let Some(piece) = self.pieces.next() {
                self.segmenter.accept_waveform(piece);
                continue;
            }
            if self.flushed {
                return None;
            }
            self.segmenter.flush();
            self.flushed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::StubRecognizer;
    use approx::assert_relative_eq;

    const SR: usize = 16_000;

    fn tone(secs: f64) -> Vec<f32> {
        vec![0.3; (secs * SR as f64) as usize]
    }

    fn quiet(secs: f64) -> Vec<f32> {
        vec![0.0; (secs * SR as f64) as usize]
    }

    fn stub_transcriber(config: TranscriberConfig) -> Transcriber {
        Transcriber::new(config, RecognizerHandle::new(StubRecognizer::new(30.0))).unwrap()
    }

    fn silence_cuts_config() -> TranscriberConfig {
        TranscriberConfig {
            strategy: Strategy::SilenceCuts,
            chooser: ChooserConfig {
                max_chunk_duration: 10.0,
                tolerance: 5.0,
                ..ChooserConfig::default()
            },
            ..TranscriberConfig::default()
        }
    }

    #[test]
    fn defaults_fit_a_thirty_second_window() {
        assert!(TranscriberConfig::default().validate(30.0).is_ok());
    }

    #[test]
    fn segmenter_cap_above_window_is_rejected() {
        let err = TranscriberConfig::default().validate(15.0).unwrap_err();
        assert!(matches!(err, CuttleError::Config(_)));
    }

    #[test]
    fn chooser_overshoot_counts_against_window() {
        let cfg = TranscriberConfig {
            strategy: Strategy::SilenceCuts,
            ..TranscriberConfig::default()
        };
        // 30 s target + 10 s tolerance does not fit a 30 s window.
        assert!(cfg.validate(30.0).is_err());
        assert!(cfg.validate(40.0).is_ok());
    }

    #[test]
    fn sample_rate_mismatch_is_rejected() {
        let cfg = TranscriberConfig {
            target_sample_rate: 8_000,
            ..TranscriberConfig::default()
        };
        assert!(cfg.validate(30.0).is_err());
    }

    #[test]
    fn config_json_fills_defaults() {
        let cfg: TranscriberConfig = serde_json::from_str(
            r#"{"strategy":"silenceCuts","chooser":{"maxChunkDuration":12.0}}"#,
        )
        .unwrap();
        assert_eq!(cfg.strategy, Strategy::SilenceCuts);
        assert_eq!(cfg.chooser.max_chunk_duration, 12.0);
        assert_eq!(cfg.chooser.tolerance, 10.0);
        assert_eq!(cfg.target_sample_rate, 16_000);
        assert_eq!(cfg.segmenter.window_size, 512);
    }

    #[test]
    fn load_reads_json_file() {
        let path = std::env::temp_dir().join(format!("cuttle-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"segmenter":{"maxSpeechDuration":8.0}}"#).unwrap();
        let cfg = TranscriberConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(cfg.segmenter.max_speech_duration, 8.0);

        let missing = TranscriberConfig::load(Path::new("/no/such/cuttle.json")).unwrap_err();
        assert!(matches!(missing, CuttleError::Io(_)));
    }

    #[test]
    fn malformed_config_file_is_config_error() {
        let path = std::env::temp_dir().join(format!("cuttle-bad-{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").unwrap();
        let err = TranscriberConfig::load(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, CuttleError::Config(_)));
    }

    #[test]
    fn streaming_job_recognises_each_utterance() {
        let transcriber = stub_transcriber(TranscriberConfig::default());
        let mut samples = tone(2.0);
        samples.extend(quiet(1.0));
        samples.extend(tone(3.0));
        samples.extend(quiet(1.0));
        let chunk = AudioChunk::new(samples, SR as u32);

        let transcript = transcriber
            .transcribe_chunk(&chunk, &AtomicBool::new(false))
            .unwrap();

        assert_eq!(transcript.segments.len(), 2);
        assert_relative_eq!(transcript.segments[0].start_seconds, 0.0);
        assert_relative_eq!(transcript.segments[1].start_seconds, 3.0, epsilon = 0.04);
        assert!(transcript.full_text.starts_with("[stub: "));
    }

    #[test]
    fn streaming_job_forces_cuts_on_continuous_speech() {
        let transcriber = stub_transcriber(TranscriberConfig::default());
        let chunk = AudioChunk::new(tone(45.0), SR as u32);

        let transcript = transcriber
            .transcribe_chunk(&chunk, &AtomicBool::new(false))
            .unwrap();

        assert_eq!(transcript.segments.len(), 3);
        assert!(transcript
            .segments
            .iter()
            .all(|s| s.duration_seconds() <= 20.0 + 1e-9));
        let snap = transcriber.diagnostics_snapshot();
        assert_eq!(snap.forced_cuts, 2);
        assert_eq!(snap.segments_emitted, 3);
    }

    #[test]
    fn silence_cut_job_of_short_audio_is_one_segment() {
        let transcriber = stub_transcriber(silence_cuts_config());
        let chunk = AudioChunk::new(tone(4.0), SR as u32);

        let transcript = transcriber
            .transcribe_chunk(&chunk, &AtomicBool::new(false))
            .unwrap();

        assert_eq!(transcript.segments.len(), 1);
        assert_relative_eq!(transcript.segments[0].end_seconds, 4.0);
    }

    #[test]
    fn silence_cut_job_cuts_inside_silence() {
        let transcriber = stub_transcriber(silence_cuts_config());
        let mut samples = tone(8.0);
        samples.extend(quiet(1.0));
        samples.extend(tone(8.0));
        let chunk = AudioChunk::new(samples, SR as u32);

        let transcript = transcriber
            .transcribe_chunk(&chunk, &AtomicBool::new(false))
            .unwrap();

        assert_eq!(transcript.segments.len(), 2);
        assert_relative_eq!(transcript.segments[1].start_seconds, 8.5, epsilon = 0.02);
        assert_relative_eq!(transcript.segments[0].end_seconds, transcript.segments[1].start_seconds);
    }

    #[test]
    fn wrong_rate_chunk_is_rejected() {
        let transcriber = stub_transcriber(TranscriberConfig::default());
        let chunk = AudioChunk::new(vec![0.3; 8_000], 8_000);
        let err = transcriber
            .transcribe_chunk(&chunk, &AtomicBool::new(false))
            .unwrap_err();
        assert!(matches!(err, CuttleError::Config(_)));
    }

    #[test]
    fn cancelled_job_reports_cancelled() {
        let transcriber = stub_transcriber(TranscriberConfig::default());
        let chunk = AudioChunk::new(tone(2.0), SR as u32);
        let err = transcriber
            .transcribe_chunk(&chunk, &AtomicBool::new(true))
            .unwrap_err();
        assert!(matches!(err, CuttleError::Cancelled));
    }

    #[test]
    fn progress_ends_with_completed() {
        let transcriber = stub_transcriber(TranscriberConfig::default());
        let mut rx = transcriber.subscribe_progress();
        let mut samples = tone(1.0);
        samples.extend(quiet(1.0));
        samples.extend(tone(1.0));
        let chunk = AudioChunk::new(samples, SR as u32);

        transcriber
            .transcribe_chunk(&chunk, &AtomicBool::new(false))
            .unwrap();

        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], TranscriptProgress::Segment { index: 0, .. }));
        assert!(matches!(events[1], TranscriptProgress::Segment { index: 1, .. }));
        match &events[2] {
            TranscriptProgress::Completed {
                segment_count,
                diagnostics,
            } => {
                assert_eq!(*segment_count, 2);
                assert_eq!(diagnostics.recognizer_calls, 2);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn detector_factory_is_used_per_job() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let transcriber = stub_transcriber(TranscriberConfig::default()).with_detector_factory(
            move || {
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(Box::new(EnergyVad::default()) as Box<dyn VoiceActivityDetector>)
            },
        );
        let chunk = AudioChunk::new(tone(1.0), SR as u32);
        let cancel = AtomicBool::new(false);

        transcriber.transcribe_chunk(&chunk, &cancel).unwrap();
        transcriber.transcribe_chunk(&chunk, &cancel).unwrap();

        assert_eq!(built.load(Ordering::Relaxed), 2);
        assert_eq!(transcriber.diagnostics_snapshot().segments_emitted, 2);
    }
}
