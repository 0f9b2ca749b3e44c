//! Sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! Decoded files arrive at whatever rate they were recorded at (44.1 kHz,
//! 48 kHz, ...). Recognizers and the VAD want 16 kHz mono f32. `RateConverter`
//! bridges that gap block by block; [`resample_all`] converts a whole decoded
//! buffer including the resampler's tail.
//!
//! When source rate == target rate, `RateConverter` is a passthrough and no
//! rubato session is created at all.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::error::{CuttleError, Result};

/// Input frames per rubato call.
pub const RESAMPLE_CHUNK: usize = 1024;

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when source rate == target rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Holds partial input blocks between calls.
    input_buf: Vec<f32>,
    chunk_size: usize,
    /// Pre-allocated output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// Create a new converter.
    ///
    /// # Errors
    /// Returns `CuttleError::Decode` if rubato fails to initialise or either
    /// rate is zero.
    pub fn new(source_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 {
            return Err(CuttleError::Decode(format!(
                "invalid resample rates {source_rate} -> {target_rate}"
            )));
        }
        if source_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = target_rate as f64 / source_rate as f64;
        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio, no dynamic adjustment
            PolynomialDegree::Cubic,
            chunk_size,
            1, // mono
        )
        .map_err(|e| CuttleError::Decode(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        tracing::debug!(source_rate, target_rate, chunk_size, max_out, "resampler ready");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::new(),
            chunk_size,
            output_buf: vec![vec![0f32; max_out]; 1],
        })
    }

    /// Process incoming samples, returning resampled output (may be empty).
    ///
    /// Samples are accumulated internally until a full `chunk_size` block is
    /// available for rubato. Any remainder is kept for the next call.
    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let Some(ref mut resampler) = self.resampler else {
            return Ok(samples.to_vec());
        };

        self.input_buf.extend_from_slice(samples);
        let mut result = Vec::new();

        while self.input_buf.len() >= self.chunk_size {
            let input_slice = &self.input_buf[..self.chunk_size];
            let (_consumed, produced) = resampler
                .process_into_buffer(&[input_slice], &mut self.output_buf, None)
                .map_err(|e| CuttleError::Decode(format!("resample: {e}")))?;
            result.extend_from_slice(&self.output_buf[0][..produced]);
            self.input_buf.drain(..self.chunk_size);
        }

        Ok(result)
    }

    /// Flush the buffered remainder and the resampler's internal delay line.
    pub fn finish(&mut self) -> Result<Vec<f32>> {
        let Some(ref mut resampler) = self.resampler else {
            return Ok(Vec::new());
        };
        let mut result = Vec::new();

        let tail = std::mem::take(&mut self.input_buf);
        let (_, produced) = resampler
            .process_partial_into_buffer(Some(&[tail.as_slice()][..]), &mut self.output_buf, None)
            .map_err(|e| CuttleError::Decode(format!("resample tail: {e}")))?;
        result.extend_from_slice(&self.output_buf[0][..produced]);

        let (_, produced) = resampler
            .process_partial_into_buffer(None::<&[&[f32]]>, &mut self.output_buf, None)
            .map_err(|e| CuttleError::Decode(format!("resample flush: {e}")))?;
        result.extend_from_slice(&self.output_buf[0][..produced]);

        Ok(result)
    }

    /// Output samples the resampler lags behind its input.
    pub fn output_delay(&self) -> usize {
        self.resampler.as_ref().map_or(0, |r| r.output_delay())
    }

    /// Returns `true` when source rate == target rate (no resampling occurs).
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

/// Resample a whole buffer, compensating for the resampler delay so the
/// output is time-aligned with the input and has the expected length.
pub fn resample_all(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    let mut rc = RateConverter::new(source_rate, target_rate, RESAMPLE_CHUNK)?;
    if rc.is_passthrough() {
        return Ok(samples.to_vec());
    }
    let expected =
        (samples.len() as f64 * target_rate as f64 / source_rate as f64).round() as usize;
    let delay = rc.output_delay();

    let mut out = rc.process(samples)?;
    out.extend(rc.finish()?);

    let start = delay.min(out.len());
    let mut aligned = out.split_off(start);
    aligned.resize(expected, 0.0);
    Ok(aligned)
}
