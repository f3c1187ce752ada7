use std::io::Cursor;

use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageReader, Limits};
use ndarray::{Array3, Array4, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::{ImageLimits, MAX_IMAGE_SIZE};

const RGB_CHANNELS: usize = 3;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("failed to decode image: {source}")]
    Decode {
        #[from]
        source: image::ImageError,
    },

    #[error("input bytes empty")]
    EmptyInput,

    #[error("input too large: {size} bytes, max {max_size}")]
    InputTooLarge { size: usize, max_size: usize },

    #[error("unsupported image format")]
    UnsupportedFormat,

    #[error("image too large: {width}x{height} = {pixels} pixels, max {max_pixels}")]
    ImageTooLarge {
        width: u32,
        height: u32,
        pixels: u64,
        max_pixels: u64,
    },

    #[error("invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("tensor shape error: {0}")]
    Shape(String),
}

/// Pixel size of the image as it arrived, before any resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn as_array(self) -> [u32; 2] {
        [self.width, self.height]
    }
}

/// Model-ready input: `[1, 3, N, N]` RGB in `[0, 1]`, plus the source size.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub tensor: Array4<f32>,
    pub original_size: ImageDimensions,
}

/// Decodes `raw_bytes`, stretches it to `image_size`², and lays it out NCHW.
///
/// The resize is a plain stretch (no letterbox); the downstream geometry
/// calibration is tuned against stretched input.
///
/// # Errors
///
/// Any failure to read the bytes as a bounded image is a `PreprocessError`.
#[instrument(skip(raw_bytes, limits), fields(input_size = raw_bytes.len()))]
pub fn preprocess_image(
    raw_bytes: &[u8],
    image_size: u32,
    limits: &ImageLimits,
) -> Result<PreparedImage, PreprocessError> {
    let img = decode_image(limits, raw_bytes)?;
    let (width, height) = img.dimensions();
    let original_size = ImageDimensions::new(width, height);

    let tensor = to_nchw_tensor(&img, image_size)?;

    debug!(width, height, image_size, "image preprocessed");

    Ok(PreparedImage {
        tensor,
        original_size,
    })
}

fn to_nchw_tensor(img: &DynamicImage, image_size: u32) -> Result<Array4<f32>, PreprocessError> {
    if image_size == 0 || image_size > MAX_IMAGE_SIZE {
        return Err(PreprocessError::InvalidDimensions {
            width: image_size,
            height: image_size,
        });
    }

    let resized = img.resize_exact(image_size, image_size, FilterType::CatmullRom);
    let rgb = resized.to_rgb8();

    let side = image_size as usize;
    let plane = side * side;
    let raw = rgb.as_raw();

    if raw.len() != plane * RGB_CHANNELS {
        return Err(PreprocessError::Shape(format!(
            "expected {} bytes, got {}",
            plane * RGB_CHANNELS,
            raw.len()
        )));
    }

    // Interleaved HWC -> planar CHW.
    let mut data = vec![0.0f32; plane * RGB_CHANNELS];
    for (i, pixel) in raw.chunks_exact(RGB_CHANNELS).enumerate() {
        for (c, &value) in pixel.iter().enumerate() {
            data[c * plane + i] = f32::from(value) / 255.0;
        }
    }

    let chw = Array3::from_shape_vec((RGB_CHANNELS, side, side), data)
        .map_err(|e| PreprocessError::Shape(e.to_string()))?;

    Ok(chw.insert_axis(Axis(0)))
}

fn decode_image(limits: &ImageLimits, raw_bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
    if raw_bytes.is_empty() {
        return Err(PreprocessError::EmptyInput);
    }

    if raw_bytes.len() > limits.max_input_bytes {
        return Err(PreprocessError::InputTooLarge {
            size: raw_bytes.len(),
            max_size: limits.max_input_bytes,
        });
    }

    let mut reader = ImageReader::new(Cursor::new(raw_bytes))
        .with_guessed_format()
        .map_err(|e| PreprocessError::Decode { source: e.into() })?;

    if reader.format().is_none() {
        return Err(PreprocessError::UnsupportedFormat);
    }

    let mut decode_limits = Limits::default();
    decode_limits.max_image_width = Some(limits.max_dimension);
    decode_limits.max_image_height = Some(limits.max_dimension);
    decode_limits.max_alloc = Some(limits.max_alloc_bytes);
    reader.limits(decode_limits);

    let img = reader.decode()?;
    let (width, height) = img.dimensions();

    if width == 0 || height == 0 {
        return Err(PreprocessError::InvalidDimensions { width, height });
    }

    let pixels = u64::from(width) * u64::from(height);
    if pixels > limits.max_image_pixels {
        return Err(PreprocessError::ImageTooLarge {
            width,
            height,
            pixels,
            max_pixels: limits.max_image_pixels,
        });
    }

    Ok(img)
}
