//! Silero VAD neural frame classifier.
//!
//! Wraps the Silero VAD ONNX model published at
//! <https://github.com/snakers4/silero-vad> and exposes its per-window speech
//! probability to the streaming segmenter. Windows are fixed at 512 samples
//! (32 ms at 16 kHz).
//!
//! Both the v4 LSTM layout (`h`/`c` in, `hn`/`cn` out) and the v5 GRU layout
//! (`state` in, `stateN` out) are detected from the session's I/O names.

use std::path::Path;

use ndarray::{Array1, Array2, Array3};
use ort::session::builder::SessionBuilder;
use ort::session::{Session, SessionInputValue};
use ort::value::Value;
use tracing::{info, warn};

use super::VoiceActivityDetector;
use crate::error::{CuttleError, Result};

/// Window size expected by Silero VAD.
pub const SILERO_WINDOW: usize = 512;
/// v4 LSTM: 2 layers x 1 batch x 64 units, for each of h and c.
const LSTM_SIZE: usize = 128;
/// v5 GRU: 2 layers x 1 batch x 128 units.
const GRU_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Recurrent {
    Lstm {
        h_in: String,
        c_in: String,
        h_out: String,
        c_out: String,
    },
    Gru {
        state_in: String,
        state_out: Option<String>,
    },
    Stateless,
}

/// Neural VAD backed by a Silero ONNX session.
pub struct SileroVad {
    session: Session,
    recurrent: Recurrent,
    input_name: String,
    sr_name: Option<String>,
    output_name: String,
    sample_rate: u32,
    h: Vec<f32>,
    c: Vec<f32>,
    state: Vec<f32>,
}

fn onnx_err(e: impl std::fmt::Display) -> CuttleError {
    CuttleError::OnnxSession(e.to_string())
}

impl SileroVad {
    /// Load the model at `path` for audio at `sample_rate` (8 kHz or 16 kHz).
    pub fn new(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CuttleError::ModelNotFound {
                path: path.to_path_buf(),
            });
        }
        if sample_rate != 16_000 && sample_rate != 8_000 {
            return Err(CuttleError::Config(format!(
                "Silero VAD supports 8000 or 16000 Hz, got {sample_rate}"
            )));
        }

        let session = SessionBuilder::new()
            .map_err(onnx_err)?
            .commit_from_file(path)
            .map_err(onnx_err)?;

        let inputs: Vec<String> = session
            .inputs()
            .iter()
            .map(|outlet| outlet.name().to_string())
            .collect();
        let outputs: Vec<String> = session
            .outputs()
            .iter()
            .map(|outlet| outlet.name().to_string())
            .collect();

        let input_name = resolve_name(&inputs, &["input", "audio", "x"])
            .or_else(|| inputs.first().cloned())
            .ok_or_else(|| onnx_err("Silero model has no inputs"))?;
        let output_name = resolve_name(&outputs, &["output", "speech_prob", "prob"])
            .or_else(|| outputs.first().cloned())
            .ok_or_else(|| onnx_err("Silero model has no outputs"))?;
        let sr_name = resolve_name(&inputs, &["sr", "sample_rate"]);

        let recurrent = match (
            resolve_name(&inputs, &["h"]),
            resolve_name(&inputs, &["c"]),
            resolve_name(&outputs, &["hn", "h_out"]),
            resolve_name(&outputs, &["cn", "c_out"]),
        ) {
            (Some(h_in), Some(c_in), Some(h_out), Some(c_out)) => Recurrent::Lstm {
                h_in,
                c_in,
                h_out,
                c_out,
            },
            _ => match resolve_name(&inputs, &["state", "h_0"]) {
                Some(state_in) => Recurrent::Gru {
                    state_in,
                    state_out: resolve_name(&outputs, &["stateN", "state_out"]),
                },
                None => Recurrent::Stateless,
            },
        };

        info!(
            path = %path.display(),
            sample_rate,
            recurrent = ?recurrent,
            "silero vad loaded"
        );

        Ok(Self {
            session,
            recurrent,
            input_name,
            sr_name,
            output_name,
            sample_rate,
            h: vec![0.0; LSTM_SIZE],
            c: vec![0.0; LSTM_SIZE],
            state: vec![0.0; GRU_SIZE],
        })
    }

    fn run_window(&mut self, window: &[f32]) -> Result<f32> {
        let input = Array2::<f32>::from_shape_vec((1, SILERO_WINDOW), window.to_vec())
            .map_err(onnx_err)?;
        let mut feeds: Vec<(String, SessionInputValue<'_>)> = vec![(
            self.input_name.clone(),
            Value::from_array(input).map_err(onnx_err)?.into(),
        )];

        if let Some(sr_name) = &self.sr_name {
            let sr = Array1::<i64>::from_elem(1, i64::from(self.sample_rate));
            feeds.push((sr_name.clone(), Value::from_array(sr).map_err(onnx_err)?.into()));
        }

        match &self.recurrent {
            Recurrent::Lstm { h_in, c_in, .. } => {
                let h = Array3::<f32>::from_shape_vec((2, 1, 64), self.h.clone())
                    .map_err(onnx_err)?;
                let c = Array3::<f32>::from_shape_vec((2, 1, 64), self.c.clone())
                    .map_err(onnx_err)?;
                feeds.push((h_in.clone(), Value::from_array(h).map_err(onnx_err)?.into()));
                feeds.push((c_in.clone(), Value::from_array(c).map_err(onnx_err)?.into()));
            }
            Recurrent::Gru { state_in, .. } => {
                let state = Array3::<f32>::from_shape_vec((2, 1, 128), self.state.clone())
                    .map_err(onnx_err)?;
                feeds.push((
                    state_in.clone(),
                    Value::from_array(state).map_err(onnx_err)?.into(),
                ));
            }
            Recurrent::Stateless => {}
        }

        let outputs = self.session.run(feeds).map_err(onnx_err)?;

        let prob = match outputs.get(self.output_name.as_str()) {
            Some(value) => {
                let (_, data) = value.try_extract_tensor::<f32>().map_err(onnx_err)?;
                data.first().copied().unwrap_or(0.0)
            }
            None => return Err(onnx_err("Silero output tensor missing")),
        };

        let mut lost_state = false;
        match &self.recurrent {
            Recurrent::Lstm { h_out, c_out, .. } => {
                match (outputs.get(h_out.as_str()), outputs.get(c_out.as_str())) {
                    (Some(hn), Some(cn)) => {
                        self.h = hn.try_extract_tensor::<f32>().map_err(onnx_err)?.1.to_vec();
                        self.c = cn.try_extract_tensor::<f32>().map_err(onnx_err)?.1.to_vec();
                    }
                    _ => lost_state = true,
                }
            }
            Recurrent::Gru {
                state_out: Some(state_out),
                ..
            } => match outputs.get(state_out.as_str()) {
                Some(sn) => {
                    self.state = sn.try_extract_tensor::<f32>().map_err(onnx_err)?.1.to_vec();
                }
                None => lost_state = true,
            },
            _ => {}
        }
        drop(outputs);

        if lost_state {
            warn!("silero state outputs missing; continuing stateless");
            self.recurrent = Recurrent::Stateless;
        }

        Ok(prob.clamp(0.0, 1.0))
    }
}

fn resolve_name(candidates: &[String], preferred: &[&str]) -> Option<String> {
    preferred.iter().find_map(|needle| {
        candidates
            .iter()
            .find(|name| name.eq_ignore_ascii_case(needle))
            .cloned()
    })
}

impl VoiceActivityDetector for SileroVad {
    fn speech_probability(&mut self, frame: &[f32]) -> Result<f32> {
        if frame.len() != SILERO_WINDOW {
            return Err(CuttleError::Config(format!(
                "Silero VAD expects {SILERO_WINDOW}-sample frames, got {}",
                frame.len()
            )));
        }
        self.run_window(frame)
    }

    fn required_frame_size(&self) -> Option<usize> {
        Some(SILERO_WINDOW)
    }

    fn reset(&mut self) {
        self.h.iter_mut().for_each(|v| *v = 0.0);
        self.c.iter_mut().for_each(|v| *v = 0.0);
        self.state.iter_mut().for_each(|v| *v = 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_is_reported() {
        match SileroVad::new("/no/such/silero_vad.onnx", 16_000) {
            Err(CuttleError::ModelNotFound { path }) => {
                assert!(path.ends_with("silero_vad.onnx"));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("model should not load"),
        }
    }

    #[test]
    fn name_resolution_is_case_insensitive_and_ordered() {
        let names = vec!["Input".to_string(), "sr".to_string(), "stateN".to_string()];
        assert_eq!(resolve_name(&names, &["input", "x"]), Some("Input".into()));
        assert_eq!(resolve_name(&names, &["statex", "staten"]), Some("stateN".into()));
        assert_eq!(resolve_name(&names, &["h"]), None);
    }
}
