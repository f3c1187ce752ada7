use serde::{Deserialize, Serialize};

use crate::error::{DetectionError, ErrorBody};
use crate::image_processing::ImageDimensions;
use crate::model::{DartDetection, DetectionResult, ModelInfo};

/// Wraps ranked detections with the model metadata the caller reports.
pub fn assemble(
    detections: Vec<DartDetection>,
    model_name: &str,
    image_size: u32,
    original_size: ImageDimensions,
) -> DetectionResult {
    let darts_count = detections.len();
    DetectionResult {
        detections,
        model_info: ModelInfo {
            model: model_name.to_string(),
            image_size,
            original_size: original_size.as_array(),
        },
        darts_count,
    }
}

/// What goes over the wire: either the result or `{ "error": "..." }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetectionResponse {
    Detections(DetectionResult),
    Error(ErrorBody),
}

impl DetectionResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, DetectionResponse::Error(_))
    }
}

impl From<Result<DetectionResult, DetectionError>> for DetectionResponse {
    fn from(result: Result<DetectionResult, DetectionError>) -> Self {
        match result {
            Ok(r) => DetectionResponse::Detections(r),
            Err(e) => DetectionResponse::Error(ErrorBody::from(&e)),
        }
    }
}
