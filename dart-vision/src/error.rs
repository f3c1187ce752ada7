use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::image_processing::PreprocessError;
use crate::inference::InferenceError;

/// Call-level failure of the detection pipeline.
///
/// Any of these aborts the whole call; callers never see partial detections
/// alongside an error.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("image decode failed: {0}")]
    Decode(#[from] PreprocessError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),
}

impl DetectionError {
    /// Short, stable name of the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            DetectionError::Decode(_) => "DecodeError",
            DetectionError::Config(_) => "ConfigError",
            DetectionError::Inference(_) => "InferenceError",
        }
    }
}

/// Wire shape of a failed call: `{ "error": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl From<&DetectionError> for ErrorBody {
    fn from(e: &DetectionError) -> Self {
        Self {
            error: format!("Detection error: {}: {e}", e.kind()),
        }
    }
}
