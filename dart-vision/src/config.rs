use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Model input side length the deployed dart model was exported with.
pub const DEFAULT_IMAGE_SIZE: u32 = 2176;

/// Keeps true darts while dropping the detector's low-score chatter.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.09;

/// Calibrated for the ceiling-mounted camera rig; see `ScaleCalibration`.
pub const DEFAULT_SCALE_DIVISOR: f64 = 20.0;

pub const DEFAULT_MODEL_NAME: &str = "YOLO11n-OBB";

/// Largest model input side accepted; a 4096² RGB f32 tensor is ~200 MB.
pub const MAX_IMAGE_SIZE: u32 = 4096;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("model not loaded")]
    ModelNotLoaded,

    #[error("image_size must be positive")]
    ZeroImageSize,

    #[error("image_size {size} exceeds maximum {max}")]
    ImageSizeTooLarge { size: u32, max: u32 },

    #[error("confidence_threshold {0} outside [0, 1)")]
    InvalidThreshold(f64),

    #[error("scale_calibration_divisor {0} must be finite and > 0")]
    InvalidScaleDivisor(f64),

    #[error("invalid decode limits: {0}")]
    InvalidLimits(&'static str),

    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Bounds applied while decoding untrusted image bytes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageLimits {
    pub max_input_bytes: usize,
    pub max_dimension: u32,
    pub max_alloc_bytes: u64,
    pub max_image_pixels: u64,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_input_bytes: 50 * 1024 * 1024,
            max_dimension: 15_000,
            max_alloc_bytes: 512 * 1024 * 1024,
            max_image_pixels: 100_000_000,
        }
    }
}

/// Deployment parameters of the dart detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Side length of the square model input.
    pub image_size: u32,
    /// Detections must score strictly above this after normalization.
    pub confidence_threshold: f64,
    /// `scale_factor = min(orig_w, orig_h) / scale_calibration_divisor`.
    pub scale_calibration_divisor: f64,
    /// Label reported in `model_info`; never used to pick a model.
    pub model_name: String,
    pub limits: ImageLimits,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            image_size: DEFAULT_IMAGE_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            scale_calibration_divisor: DEFAULT_SCALE_DIVISOR,
            model_name: DEFAULT_MODEL_NAME.to_string(),
            limits: ImageLimits::default(),
        }
    }
}

impl DetectorConfig {
    /// Parses a JSON document; absent fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` on malformed JSON, or the first
    /// validation failure.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns the first parameter that cannot drive the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image_size == 0 {
            return Err(ConfigError::ZeroImageSize);
        }
        let max = MAX_IMAGE_SIZE.min(self.limits.max_dimension);
        if self.image_size > max {
            return Err(ConfigError::ImageSizeTooLarge {
                size: self.image_size,
                max,
            });
        }

        let t = self.confidence_threshold;
        if !t.is_finite() || !(0.0..1.0).contains(&t) {
            return Err(ConfigError::InvalidThreshold(t));
        }

        let d = self.scale_calibration_divisor;
        if !d.is_finite() || d <= 0.0 {
            return Err(ConfigError::InvalidScaleDivisor(d));
        }

        if self.limits.max_input_bytes == 0 {
            return Err(ConfigError::InvalidLimits("max_input_bytes is zero"));
        }
        if self.limits.max_dimension == 0 || self.limits.max_image_pixels == 0 {
            return Err(ConfigError::InvalidLimits("image bounds are zero"));
        }

        Ok(())
    }
}
