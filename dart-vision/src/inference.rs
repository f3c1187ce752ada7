use ndarray::ArrayView4;
use thiserror::Error;

use crate::decoder::RawOutput;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InferenceError {
    /// Details are logged where the failure happens, never carried outward.
    #[error("inference engine error")]
    Engine,

    #[error("model input missing")]
    MissingInput,

    #[error("model output missing")]
    MissingOutput,

    #[error("unexpected output rank: {0}")]
    UnexpectedRank(usize),

    #[error("session lock poisoned")]
    Poisoned,

    #[error("model output too large: {rows} rows of {fields} fields")]
    OutputTooLarge { rows: usize, fields: usize },
}

/// Upper bound on candidate rows copied out of a model output.
pub const MAX_OUTPUT_ROWS: usize = 50_000;

/// Upper bound on values per row; the row contract needs seven.
pub const MAX_OUTPUT_FIELDS: usize = 64;

/// Checks a `[rows, fields]` or `[batch, rows, fields]` output shape
/// before any data is copied.
///
/// # Errors
///
/// `UnexpectedRank` for other ranks, `OutputTooLarge` past the row or
/// field ceiling.
pub fn check_output_shape(shape: &[usize]) -> Result<(), InferenceError> {
    let (rows, fields) = match *shape {
        [rows, fields] | [_, rows, fields] => (rows, fields),
        _ => return Err(InferenceError::UnexpectedRank(shape.len())),
    };
    if rows > MAX_OUTPUT_ROWS || fields > MAX_OUTPUT_FIELDS {
        return Err(InferenceError::OutputTooLarge { rows, fields });
    }
    Ok(())
}

impl InferenceError {
    /// Logs `detail` and returns the opaque engine error.
    pub fn backend(detail: impl std::fmt::Display) -> Self {
        tracing::error!(error = %detail, "inference backend error");
        InferenceError::Engine
    }
}

/// The loaded detector, owned by the caller and shared read-only.
pub trait InferenceBackend: Send + Sync {
    fn input_tensor_name(&self) -> &str;

    /// Runs one `[1, 3, N, N]` tensor and returns the raw detection rows.
    ///
    /// # Errors
    ///
    /// Any backend failure; the message must not leak engine internals.
    fn run(&self, input: ArrayView4<'_, f32>) -> Result<RawOutput, InferenceError>;
}

impl<T: InferenceBackend + ?Sized> InferenceBackend for &T {
    fn input_tensor_name(&self) -> &str {
        (**self).input_tensor_name()
    }

    fn run(&self, input: ArrayView4<'_, f32>) -> Result<RawOutput, InferenceError> {
        (**self).run(input)
    }
}

#[cfg(feature = "ml")]
pub use self::onnx::OrtBackend;

#[cfg(feature = "ml")]
mod onnx {
    use std::path::Path;
    use std::sync::Mutex;

    use ndarray::{ArrayView4, ArrayViewD, Ix2, Ix3};
    use ort::session::Session;
    use tracing::{debug, instrument};

    use super::{check_output_shape, InferenceBackend, InferenceError};
    use crate::decoder::RawOutput;

    impl From<ort::Error> for InferenceError {
        fn from(e: ort::Error) -> Self {
            InferenceError::backend(e)
        }
    }

    /// ONNX Runtime session holding the dart OBB model.
    ///
    /// `run` is serialized through a mutex; share one backend behind an `Arc`
    /// or keep a pool for throughput.
    pub struct OrtBackend {
        session: Mutex<Session>,
        input_name: String,
        output_name: String,
    }

    impl OrtBackend {
        /// # Errors
        ///
        /// Fails if the runtime rejects the model or it has no inputs/outputs.
        #[instrument(skip(model_bytes), fields(model_size = model_bytes.len()))]
        pub fn from_memory(model_bytes: &[u8]) -> Result<Self, InferenceError> {
            let session = Session::builder()?.commit_from_memory(model_bytes)?;
            Self::from_session(session)
        }

        /// # Errors
        ///
        /// Fails if the file cannot be loaded as an ONNX model.
        #[instrument(skip_all, fields(path = %path.as_ref().display()))]
        pub fn from_file(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
            let session = Session::builder()?.commit_from_file(path.as_ref())?;
            Self::from_session(session)
        }

        fn from_session(session: Session) -> Result<Self, InferenceError> {
            let input_name = session
                .inputs
                .first()
                .map(|i| i.name.clone())
                .ok_or(InferenceError::MissingInput)?;
            let output_name = session
                .outputs
                .first()
                .map(|o| o.name.clone())
                .ok_or(InferenceError::MissingOutput)?;

            debug!(%input_name, %output_name, "model loaded");

            Ok(Self {
                session: Mutex::new(session),
                input_name,
                output_name,
            })
        }
    }

    impl InferenceBackend for OrtBackend {
        fn input_tensor_name(&self) -> &str {
            &self.input_name
        }

        fn run(&self, input: ArrayView4<'_, f32>) -> Result<RawOutput, InferenceError> {
            let tensor = ort::value::Tensor::from_array(input.to_owned())?;

            let mut session = self.session.lock().map_err(|_| InferenceError::Poisoned)?;
            let outputs = session.run(ort::inputs![self.input_name.as_str() => tensor])?;

            let output = outputs
                .get(self.output_name.as_str())
                .ok_or(InferenceError::MissingOutput)?;

            let view: ArrayViewD<'_, f32> = output.try_extract_array::<f32>()?;
            check_output_shape(view.shape())?;
            match view.ndim() {
                2 => {
                    let rows = view
                        .into_dimensionality::<Ix2>()
                        .map_err(InferenceError::backend)?;
                    Ok(RawOutput::from_array(rows))
                }
                3 => {
                    let batched = view
                        .into_dimensionality::<Ix3>()
                        .map_err(InferenceError::backend)?;
                    Ok(RawOutput::from_batched(batched))
                }
                n => Err(InferenceError::UnexpectedRank(n)),
            }
        }
    }
}
