use crate::geometry::OrientedBox;
use crate::model::DartDetection;

/// A transformed detection that cleared the confidence filter, not yet ranked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub obb: OrientedBox,
    pub confidence: f64,
    pub class_id: i32,
}

/// Orders candidates by confidence, highest first, and numbers them 1..=N.
///
/// The sort is stable: equal confidences keep their input order.
pub fn rank(mut candidates: Vec<Candidate>) -> Vec<DartDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    candidates
        .into_iter()
        .enumerate()
        .map(|(i, c)| DartDetection {
            x_center: c.obb.x_center,
            y_center: c.obb.y_center,
            width: c.obb.width,
            height: c.obb.height,
            angle: c.obb.angle,
            confidence: c.confidence,
            class_id: c.class_id,
            detection_index: i + 1,
            corners: c.obb.corners(),
            bbox: c.obb.bbox(),
        })
        .collect()
}
