use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{BoundingBox, Point};

/// One ranked dart, in original-image pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DartDetection {
    pub x_center: f64,
    pub y_center: f64,
    pub width: f64,
    pub height: f64,
    /// Degrees.
    pub angle: f64,
    pub confidence: f64,
    pub class_id: i32,
    /// 1-based rank by confidence.
    pub detection_index: usize,
    pub corners: [Point; 4],
    pub bbox: BoundingBox,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model: String,
    pub image_size: u32,
    /// `[width, height]`
    pub original_size: [u32; 2],
}

/// Ranked detections for one image.
///
/// Built by [`assemble`](crate::response::assemble), which keeps
/// `darts_count == detections.len()`. Deserializing enforces the same.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DetectionResultWire")]
#[must_use]
pub struct DetectionResult {
    pub(crate) detections: Vec<DartDetection>,
    pub(crate) model_info: ModelInfo,
    pub(crate) darts_count: usize,
}

impl DetectionResult {
    pub fn detections(&self) -> &[DartDetection] {
        &self.detections
    }

    pub fn model_info(&self) -> &ModelInfo {
        &self.model_info
    }

    pub fn darts_count(&self) -> usize {
        self.darts_count
    }

    pub fn into_detections(self) -> Vec<DartDetection> {
        self.detections
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("darts_count {darts_count} does not match {detections} detections")]
pub struct CountMismatch {
    pub darts_count: usize,
    pub detections: usize,
}

#[derive(Deserialize)]
struct DetectionResultWire {
    detections: Vec<DartDetection>,
    model_info: ModelInfo,
    darts_count: usize,
}

impl TryFrom<DetectionResultWire> for DetectionResult {
    type Error = CountMismatch;

    fn try_from(wire: DetectionResultWire) -> Result<Self, Self::Error> {
        if wire.darts_count != wire.detections.len() {
            return Err(CountMismatch {
                darts_count: wire.darts_count,
                detections: wire.detections.len(),
            });
        }
        Ok(Self {
            detections: wire.detections,
            model_info: wire.model_info,
            darts_count: wire.darts_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire(darts_count: usize) -> serde_json::Value {
        json!({
            "detections": [],
            "model_info": {
                "model": "YOLO11n-OBB",
                "image_size": 2176,
                "original_size": [2000, 1000]
            },
            "darts_count": darts_count
        })
    }

    #[test]
    fn consistent_count_deserializes() {
        let result: DetectionResult = serde_json::from_value(wire(0)).unwrap();
        assert_eq!(result.darts_count(), 0);
        assert!(result.detections().is_empty());
    }

    #[test]
    fn mismatched_count_is_rejected() {
        let err = serde_json::from_value::<DetectionResult>(wire(7)).unwrap_err();
        assert!(err.to_string().contains("darts_count 7 does not match 0"));
    }
}
