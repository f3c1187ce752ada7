//! Model-space to image-space mapping for oriented boxes.

use serde::{Deserialize, Serialize};

use crate::decoder::RawDetectionRow;
use crate::image_processing::ImageDimensions;

/// A corner as `[x, y]` in original-image pixels.
pub type Point = [f64; 2];

/// Empirical scale between model coordinates and image pixels.
///
/// `scale_factor = min(orig_w, orig_h) / divisor`. The divisor was fitted to
/// one camera height and lens; a different rig needs a new value, not a new
/// formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleCalibration {
    divisor: f64,
}

impl ScaleCalibration {
    pub fn new(divisor: f64) -> Self {
        Self { divisor }
    }

    pub fn divisor(&self) -> f64 {
        self.divisor
    }

    pub fn scale_factor(&self, size: ImageDimensions) -> f64 {
        f64::from(size.width.min(size.height)) / self.divisor
    }
}

/// Axis-aligned `x1,y1,x2,y2`, taken from the unrotated extents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// Oriented box in original-image space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    pub x_center: f64,
    pub y_center: f64,
    pub width: f64,
    pub height: f64,
    /// Degrees, as emitted by the model.
    pub angle: f64,
}

impl OrientedBox {
    /// Scales a decoded row into `size` and clamps its center to the image.
    ///
    /// Width and height are scaled but never clamped.
    pub fn from_model_space(
        row: &RawDetectionRow,
        size: ImageDimensions,
        calibration: ScaleCalibration,
    ) -> Self {
        let s = calibration.scale_factor(size);

        let x_center = (f64::from(row.x_center) * s).clamp(0.0, f64::from(size.width));
        let y_center = (f64::from(row.y_center) * s).clamp(0.0, f64::from(size.height));

        Self {
            x_center,
            y_center,
            width: f64::from(row.width) * s,
            height: f64::from(row.height) * s,
            angle: f64::from(row.angle),
        }
    }

    /// Top-left, top-right, bottom-right, bottom-left, rotated about the
    /// center by `angle`.
    pub fn corners(&self) -> [Point; 4] {
        let hw = self.width / 2.0;
        let hh = self.height / 2.0;
        let (sin, cos) = self.angle.to_radians().sin_cos();

        [[-hw, -hh], [hw, -hh], [hw, hh], [-hw, hh]].map(|[px, py]| {
            [
                px * cos - py * sin + self.x_center,
                px * sin + py * cos + self.y_center,
            ]
        })
    }

    /// Center ± half extent. Ignores rotation, so for `angle != 0` this is
    /// not the envelope of [`corners`](Self::corners).
    pub fn bbox(&self) -> BoundingBox {
        let hw = self.width / 2.0;
        let hh = self.height / 2.0;
        BoundingBox {
            x1: self.x_center - hw,
            y1: self.y_center - hh,
            x2: self.x_center + hw,
            y2: self.y_center + hh,
        }
    }
}
