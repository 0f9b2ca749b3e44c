//! `HttpRecognizer`: adapter for a local ASR server.
//!
//! The server loads its model once and answers:
//!
//! | Method | Path          | Body                                     | Reply                      |
//! |--------|---------------|------------------------------------------|----------------------------|
//! | GET    | `/health`     | -                                        | `{ status, model_loaded }` |
//! | POST   | `/transcribe` | `{ audio_path, language?, backend? }`    | `{ text }` or `{ error }`  |
//!
//! Each segment is written to a temporary 16-bit WAV next to the server
//! (same host), posted by path, and removed once the reply arrives.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audio::write_pcm16_wav;
use crate::error::{CuttleError, Result};
use crate::inference::{Recognition, Recognizer};

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Connection settings for [`HttpRecognizer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct HttpRecognizerConfig {
    /// Base URL, e.g. `http://127.0.0.1:8765`.
    pub base_url: String,
    /// Language hint forwarded to the server (`en`, `de-DE`, ...).
    pub language: Option<String>,
    /// Server-side backend name; `None` keeps the server default.
    pub backend: Option<String>,
    /// Longest segment (seconds) the served model accepts.
    pub max_duration_secs: f64,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for HttpRecognizerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8765".into(),
            language: None,
            backend: None,
            max_duration_secs: 30.0,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Serialize)]
struct TranscribeRequest<'a> {
    audio_path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    backend: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TranscribeReply {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HealthReply {
    status: String,
    #[serde(default)]
    model_loaded: bool,
}

pub struct HttpRecognizer {
    config: HttpRecognizerConfig,
    client: reqwest::blocking::Client,
}

impl HttpRecognizer {
    pub fn new(config: HttpRecognizerConfig) -> Result<Self> {
        if config.max_duration_secs <= 0.0 {
            return Err(CuttleError::Config(
                "http recognizer max_duration_secs must be positive".into(),
            ));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| CuttleError::RecognizerUnavailable(format!("http client: {e}")))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn temp_wav_path() -> PathBuf {
        let name = format!(
            "cuttle-segment-{}-{}.wav",
            std::process::id(),
            TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        std::env::temp_dir().join(name)
    }

    fn post_transcribe(&self, wav_path: &str) -> Result<String> {
        let request = TranscribeRequest {
            audio_path: wav_path,
            language: self.config.language.as_deref(),
            backend: self.config.backend.as_deref(),
        };
        let response = self
            .client
            .post(self.url("/transcribe"))
            .json(&request)
            .send()
            .map_err(|e| CuttleError::Recognition(format!("transcribe request: {e}")))?;

        let status = response.status();
        let reply: TranscribeReply = response
            .json()
            .map_err(|e| CuttleError::Recognition(format!("transcribe reply ({status}): {e}")))?;

        if let Some(error) = reply.error {
            return Err(CuttleError::Recognition(format!("server error ({status}): {error}")));
        }
        if !status.is_success() {
            return Err(CuttleError::Recognition(format!("server returned {status}")));
        }
        Ok(reply.text.unwrap_or_default())
    }
}

impl Recognizer for HttpRecognizer {
    fn name(&self) -> &str {
        self.config.backend.as_deref().unwrap_or("http")
    }

    fn max_duration_secs(&self) -> f64 {
        self.config.max_duration_secs
    }

    fn warm_up(&mut self) -> Result<()> {
        let health: HealthReply = self
            .client
            .get(self.url("/health"))
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| CuttleError::RecognizerUnavailable(format!("{}: {e}", self.config.base_url)))?;

        if health.status != "ok" {
            return Err(CuttleError::RecognizerUnavailable(format!(
                "health status {:?}",
                health.status
            )));
        }
        info!(
            base_url = %self.config.base_url,
            model_loaded = health.model_loaded,
            "asr server reachable"
        );
        Ok(())
    }

    fn recognize(&mut self, samples: &[f32], sample_rate: u32) -> Result<Recognition> {
        let wav_path = Self::temp_wav_path();
        write_pcm16_wav(&wav_path, samples, sample_rate)?;
        debug!(path = %wav_path.display(), samples = samples.len(), "posting segment");

        let result = self.post_transcribe(&wav_path.to_string_lossy());

        if let Err(e) = std::fs::remove_file(&wav_path) {
            warn!(error = %e, path = %wav_path.display(), "failed to remove temp segment");
        }

        result.map(|text| Recognition::text(text.trim()))
    }
}
