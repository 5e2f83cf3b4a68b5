//! Error taxonomy for the recognition engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("input audio could not be decoded: {0}")]
    InputDecode(String),

    #[error("store unavailable after retries: {0}")]
    StoreUnavailable(#[from] anyhow::Error),

    #[error("timeout")]
    Timeout,

    #[error("task was canceled")]
    Canceled,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("binary encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecognitionError {
    /// Map to the engine's coarse `FAILURE` classification used in
    /// recognition results; `NO_MATCH` and missing metadata are not errors
    /// and never reach this type.
    pub fn as_failure_message(&self) -> String {
        match self {
            RecognitionError::Timeout => "timeout".to_string(),
            other => other.to_string(),
        }
    }
}
