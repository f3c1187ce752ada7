// lib.rs - dart detection post-processing core

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! Turns the raw output of an oriented-bounding-box dart detector into
//! calibrated, ranked detections in original-image pixels.
//!
//! ```text
//! bytes -> image_processing -> [InferenceBackend] -> decoder -> confidence
//!       -> geometry -> aggregate -> response
//! ```
//!
//! [`DartPipeline`] strings the stages together. The model itself lives
//! behind [`InferenceBackend`]; enable the `ml` feature for the ONNX Runtime
//! implementation.

pub mod aggregate;
pub mod confidence;
pub mod config;
pub mod decoder;
pub mod error;
pub mod geometry;
pub mod image_processing;
pub mod inference;
pub mod model;
pub mod response;
pub mod vision;

pub use config::{ConfigError, DetectorConfig, ImageLimits};
pub use decoder::{RawDetectionRow, RawOutput, RowParseError, ROW_SCHEMA_VERSION};
pub use error::{DetectionError, ErrorBody};
pub use geometry::{BoundingBox, OrientedBox, ScaleCalibration};
pub use image_processing::{preprocess_image, ImageDimensions, PreparedImage, PreprocessError};
pub use inference::{InferenceBackend, InferenceError};
pub use model::{CountMismatch, DartDetection, DetectionResult, ModelInfo};
pub use response::DetectionResponse;
pub use vision::{DartPipeline, PostprocessStats};

#[cfg(feature = "ml")]
pub use inference::OrtBackend;
