//! PCM sources: turn an audio file into mono f32 samples at the job rate.
//!
//! Container/codec support belongs to the decoder, not to segmentation. The
//! pipeline only sees [`PcmSource`]; [`WavSource`] is the built-in decoder
//! (hound) and mixes channels down and resamples to the requested rate.

pub mod resample;

use std::path::Path;

use tracing::{debug, info};

use crate::buffering::chunk::AudioChunk;
use crate::error::{CuttleError, Result};

/// Output of a [`PcmSource`].
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub chunk: AudioChunk,
    pub duration_seconds: f64,
}

/// Decodes a file into mono, fixed-rate f32 PCM.
pub trait PcmSource: Send + Sync {
    /// Sample rate every decoded buffer is delivered at.
    fn sample_rate(&self) -> u32;

    fn decode(&self, path: &Path) -> Result<DecodedAudio>;
}

/// WAV decoder (16/24/32-bit integer and 32-bit float).
#[derive(Debug, Clone)]
pub struct WavSource {
    target_sample_rate: u32,
}

impl WavSource {
    pub fn new(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }
}

impl Default for WavSource {
    fn default() -> Self {
        Self::new(16_000)
    }
}

impl PcmSource for WavSource {
    fn sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    fn decode(&self, path: &Path) -> Result<DecodedAudio> {
        let (mono, source_rate) = read_wav_mono_f32(path)?;
        let samples = resample::resample_all(&mono, source_rate, self.target_sample_rate)?;
        let chunk = AudioChunk::new(samples, self.target_sample_rate);
        let duration_seconds = chunk.duration_secs();

        info!(
            path = %path.display(),
            source_rate,
            target_rate = self.target_sample_rate,
            duration_seconds,
            "decoded wav"
        );

        Ok(DecodedAudio {
            chunk,
            duration_seconds,
        })
    }
}

/// Read a WAV file and average its channels to mono.
pub fn read_wav_mono_f32(path: &Path) -> Result<(Vec<f32>, u32)> {
    let decode_err = |e: hound::Error| CuttleError::Decode(format!("{}: {e}", path.display()));

    let mut reader = hound::WavReader::open(path).map_err(decode_err)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(decode_err)?,
        hound::SampleFormat::Int => {
            let max = ((1_i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) - 1).max(1) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(decode_err)?
        }
    };

    debug!(
        channels,
        bits = spec.bits_per_sample,
        rate = spec.sample_rate,
        frames = interleaved.len() / channels,
        "wav header"
    );

    if channels == 1 {
        return Ok((interleaved, spec.sample_rate));
    }

    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}

/// Write mono f32 samples as a 16-bit PCM WAV file.
pub fn write_pcm16_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let to_io = |e: hound::Error| match e {
        hound::Error::IoError(io) => CuttleError::Io(io),
        other => CuttleError::Decode(other.to_string()),
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(to_io)?;
    for &sample in samples {
        let v = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        writer.write_sample(v).map_err(to_io)?;
    }
    writer.finalize().map_err(to_io)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("cuttle-audio-{}-{name}", std::process::id()))
    }

    #[test]
    fn pcm16_round_trip_preserves_length_and_rate() {
        let path = temp_path("rt.wav");
        let samples: Vec<f32> = (0..1600).map(|i| ((i as f32) * 0.01).sin() * 0.5).collect();
        write_pcm16_wav(&path, &samples, 16_000).unwrap();

        let decoded = WavSource::new(16_000).decode(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(decoded.chunk.sample_rate, 16_000);
        assert_eq!(decoded.chunk.len(), 1600);
        assert!((decoded.duration_seconds - 0.1).abs() < 1e-9);
        assert!((decoded.chunk.samples[100] - samples[100]).abs() < 1e-3);
    }

    #[test]
    fn stereo_is_mixed_to_mono() {
        let path = temp_path("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(0.2f32).unwrap();
            writer.write_sample(0.4f32).unwrap();
        }
        writer.finalize().unwrap();

        let (mono, rate) = read_wav_mono_f32(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(rate, 8_000);
        assert_eq!(mono.len(), 100);
        assert!((mono[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn eight_bit_pcm_is_scaled_to_full_range() {
        let path = temp_path("pcm8.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 8,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..160 {
            writer.write_sample(100i8).unwrap();
            writer.write_sample(-127i8).unwrap();
        }
        writer.finalize().unwrap();

        let (mono, rate) = read_wav_mono_f32(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(rate, 16_000);
        assert_eq!(mono.len(), 320);
        assert!((mono[0] - 100.0 / 127.0).abs() < 1e-6, "got {}", mono[0]);
        assert!((mono[1] + 1.0).abs() < 1e-6, "got {}", mono[1]);
    }

    #[test]
    fn missing_file_is_decode_error() {
        let err = WavSource::default()
            .decode(Path::new("/definitely/not/here.wav"))
            .unwrap_err();
        assert!(matches!(err, CuttleError::Decode(_)));
    }
}
