use thiserror::Error;

/// All errors produced by cuttle-core.
#[derive(Debug, Error)]
pub enum CuttleError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("audio decode error: {0}")]
    Decode(String),

    #[error("recognition error: {0}")]
    Recognition(String),

    #[error("recognizer unavailable: {0}")]
    RecognizerUnavailable(String),

    #[error("silence detection error: {0}")]
    SilenceDetection(String),

    #[error("transcription cancelled")]
    Cancelled,

    #[error("ONNX session error: {0}")]
    OnnxSession(String),

    #[error("model file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CuttleError>;
