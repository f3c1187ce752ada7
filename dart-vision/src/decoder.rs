//! Fixed-position decoding of detector output rows.
//!
//! Row contract, version [`ROW_SCHEMA_VERSION`]:
//!
//! | index | field      | notes                                  |
//! |-------|------------|----------------------------------------|
//! | 0     | `x_center` | model space                            |
//! | 1     | `y_center` | model space                            |
//! | 2     | `width`    | model space                            |
//! | 3     | `height`   | model space                            |
//! | 4     | `angle`    | degrees                                |
//! | 5     | confidence | raw, may be on a 0-100 scale            |
//! | 6     | `class_id` | optional, truncated to an `i32`         |
//!
//! Anything past index 6 is ignored. The column layout itself is trusted.

use ndarray::{ArrayView2, ArrayView3, Axis};
use thiserror::Error;
use tracing::{debug, instrument};

pub const ROW_SCHEMA_VERSION: u32 = 1;

/// Minimum number of values a row needs to be usable.
pub const MIN_ROW_FIELDS: usize = 6;

const CLASS_ID_INDEX: usize = 6;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RowParseError {
    #[error("row has {0} fields, need at least {}", MIN_ROW_FIELDS)]
    TooFewFields(usize),

    #[error("field {index} is not a finite number")]
    NonFinite { index: usize },

    #[error("class id {0} does not fit in i32")]
    ClassIdOutOfRange(f32),
}

// 2^31, exactly representable in f32; i32::MAX is not.
const I32_UPPER_EXCLUSIVE: f32 = 2_147_483_648.0;

fn class_id_from(value: f32) -> Result<i32, RowParseError> {
    if !value.is_finite() {
        return Err(RowParseError::NonFinite {
            index: CLASS_ID_INDEX,
        });
    }
    let truncated = value.trunc();
    if !(-I32_UPPER_EXCLUSIVE..I32_UPPER_EXCLUSIVE).contains(&truncated) {
        return Err(RowParseError::ClassIdOutOfRange(value));
    }
    // In range after the check above.
    #[allow(clippy::cast_possible_truncation)]
    Ok(truncated as i32)
}

/// One detector proposal, fields pulled out of their fixed positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetectionRow {
    pub x_center: f32,
    pub y_center: f32,
    pub width: f32,
    pub height: f32,
    pub angle: f32,
    pub confidence: f32,
    pub class_id: i32,
}

impl TryFrom<&[f32]> for RawDetectionRow {
    type Error = RowParseError;

    fn try_from(row: &[f32]) -> Result<Self, Self::Error> {
        let [x_center, y_center, width, height, angle, confidence] = match row.get(..MIN_ROW_FIELDS)
        {
            Some(&[a, b, c, d, e, f]) => [a, b, c, d, e, f],
            _ => return Err(RowParseError::TooFewFields(row.len())),
        };

        if let Some(index) = [x_center, y_center, width, height, angle, confidence]
            .iter()
            .position(|v| !v.is_finite())
        {
            return Err(RowParseError::NonFinite { index });
        }

        let class_id = match row.get(CLASS_ID_INDEX) {
            Some(&v) => class_id_from(v)?,
            None => 0,
        };

        Ok(Self {
            x_center,
            y_center,
            width,
            height,
            angle,
            confidence,
            class_id,
        })
    }
}

/// Raw inference output: one numeric row per candidate.
///
/// Rows may differ in length; short rows are dropped during decoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOutput {
    rows: Vec<Vec<f32>>,
}

impl RawOutput {
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Self {
        Self { rows }
    }

    /// `[rows, fields]`.
    pub fn from_array(view: ArrayView2<'_, f32>) -> Self {
        let rows = view.axis_iter(Axis(0)).map(|r| r.to_vec()).collect();
        Self { rows }
    }

    /// `[batch, rows, fields]`; only the first batch entry is read.
    pub fn from_batched(view: ArrayView3<'_, f32>) -> Self {
        if view.len_of(Axis(0)) == 0 {
            return Self::default();
        }
        Self::from_array(view.index_axis(Axis(0), 0))
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub total: usize,
    pub skipped: usize,
}

/// Extracts every well-formed row, counting the rest.
#[instrument(skip(output), fields(rows = output.len()))]
pub fn decode_rows(output: &RawOutput) -> (Vec<RawDetectionRow>, DecodeStats) {
    let mut rows = Vec::with_capacity(output.len());
    let mut stats = DecodeStats {
        total: output.len(),
        skipped: 0,
    };

    for (i, raw) in output.rows().iter().enumerate() {
        match RawDetectionRow::try_from(raw.as_slice()) {
            Ok(row) => rows.push(row),
            Err(e) => {
                stats.skipped += 1;
                debug!(row = i, error = %e, "skipping malformed detection row");
            }
        }
    }

    (rows, stats)
}
