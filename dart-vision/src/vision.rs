use std::time::Instant;

use tracing::{debug, instrument, warn};

use crate::aggregate::{rank, Candidate};
use crate::confidence::ConfidenceFilter;
use crate::config::{ConfigError, DetectorConfig};
use crate::decoder::{decode_rows, DecodeStats, RawOutput};
use crate::error::DetectionError;
use crate::geometry::{OrientedBox, ScaleCalibration};
use crate::image_processing::{preprocess_image, ImageDimensions};
use crate::inference::InferenceBackend;
use crate::model::DetectionResult;
use crate::response::{assemble, DetectionResponse};

/// Counters for one post-processing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostprocessStats {
    pub decode: DecodeStats,
    pub below_threshold: usize,
    pub kept: usize,
}

/// Stateless dart detection pipeline for one deployment.
///
/// Holds only validated configuration. The model is passed in per call, so
/// one pipeline can serve any number of concurrent requests.
#[derive(Debug, Clone)]
pub struct DartPipeline {
    config: DetectorConfig,
    filter: ConfidenceFilter,
    calibration: ScaleCalibration,
}

impl DartPipeline {
    /// # Errors
    ///
    /// Returns `ConfigError` if any parameter cannot drive the pipeline.
    pub fn new(config: DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            filter: ConfidenceFilter::new(config.confidence_threshold),
            calibration: ScaleCalibration::new(config.scale_calibration_divisor),
            config,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Decodes the image, runs the model and ranks its detections.
    ///
    /// # Errors
    ///
    /// Unreadable image bytes or a failed inference abort the call.
    #[instrument(skip(self, backend, image_data), fields(data_len = image_data.len()))]
    pub fn detect<B>(
        &self,
        backend: &B,
        image_data: &[u8],
    ) -> Result<DetectionResult, DetectionError>
    where
        B: InferenceBackend + ?Sized,
    {
        let preprocess_start = Instant::now();
        let prepared = preprocess_image(image_data, self.config.image_size, &self.config.limits)?;
        let preprocess_ms = preprocess_start.elapsed().as_secs_f64() * 1000.0;

        let inference_start = Instant::now();
        debug!(input = backend.input_tensor_name(), "running inference");
        let raw = backend.run(prepared.tensor.view())?;
        let inference_ms = inference_start.elapsed().as_secs_f64() * 1000.0;

        let postprocess_start = Instant::now();
        let (result, stats) = self.postprocess(&raw, prepared.original_size);
        let postprocess_ms = postprocess_start.elapsed().as_secs_f64() * 1000.0;

        debug!(
            kept = stats.kept,
            skipped = stats.decode.skipped,
            below_threshold = stats.below_threshold,
            preprocess_ms,
            inference_ms,
            postprocess_ms,
            "Detection completed"
        );

        Ok(result)
    }

    /// Like [`detect`](Self::detect), but takes an optional model handle and
    /// folds any failure into the `{ "error": ... }` response.
    pub fn respond<B>(&self, backend: Option<&B>, image_data: &[u8]) -> DetectionResponse
    where
        B: InferenceBackend + ?Sized,
    {
        let result = match backend {
            Some(b) => self.detect(b, image_data),
            None => Err(DetectionError::Config(ConfigError::ModelNotLoaded)),
        };

        if let Err(e) = &result {
            warn!(error = %e, kind = e.kind(), "detection failed");
        }

        DetectionResponse::from(result)
    }

    /// Decodes, normalizes, transforms and ranks raw model rows.
    ///
    /// Pure: identical inputs give identical results.
    #[instrument(skip(self, raw), fields(rows = raw.len()))]
    pub fn postprocess(
        &self,
        raw: &RawOutput,
        original_size: ImageDimensions,
    ) -> (DetectionResult, PostprocessStats) {
        let (rows, decode) = decode_rows(raw);
        if decode.skipped > 0 {
            warn!(
                skipped = decode.skipped,
                total = decode.total,
                "malformed detection rows dropped"
            );
        }

        let mut stats = PostprocessStats {
            decode,
            ..Default::default()
        };

        let mut candidates = Vec::new();
        for row in &rows {
            let Some(confidence) = self.filter.accept(row.confidence) else {
                stats.below_threshold += 1;
                continue;
            };

            candidates.push(Candidate {
                obb: OrientedBox::from_model_space(row, original_size, self.calibration),
                confidence,
                class_id: row.class_id,
            });
        }

        let detections = rank(candidates);
        stats.kept = detections.len();

        let result = assemble(
            detections,
            &self.config.model_name,
            self.config.image_size,
            original_size,
        );

        (result, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_processing::tests::create_test_png;
    use crate::inference::InferenceError;
    use ndarray::ArrayView4;
    use proptest::prelude::*;

    struct Canned(RawOutput);

    impl InferenceBackend for Canned {
        fn input_tensor_name(&self) -> &str {
            "images"
        }

        fn run(&self, _input: ArrayView4<'_, f32>) -> Result<RawOutput, InferenceError> {
            Ok(self.0.clone())
        }
    }

    fn pipeline(threshold: f64) -> DartPipeline {
        DartPipeline::new(DetectorConfig {
            image_size: 32,
            confidence_threshold: threshold,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn new_rejects_invalid_config() {
        let result = DartPipeline::new(DetectorConfig {
            confidence_threshold: 2.0,
            ..Default::default()
        });
        assert!(matches!(result, Err(ConfigError::InvalidThreshold(_))));
    }

    #[test]
    fn postprocess_counts_every_row() {
        let raw = RawOutput::from_rows(vec![
            vec![10.0, 10.0, 4.0, 2.0, 0.0, 0.5, 0.0],
            vec![10.0, 10.0, 4.0, 2.0, 0.0, 0.01, 0.0],
            vec![1.0, 2.0, 3.0],
        ]);
        let (result, stats) =
            pipeline(0.09).postprocess(&raw, ImageDimensions::new(2000, 1000));
        assert_eq!(result.darts_count(), 1);
        assert_eq!(
            stats,
            PostprocessStats {
                decode: DecodeStats {
                    total: 3,
                    skipped: 1
                },
                below_threshold: 1,
                kept: 1,
            }
        );
    }

    #[test]
    fn percent_scale_confidence_is_not_clamped() {
        let raw = RawOutput::from_rows(vec![vec![5.0, 5.0, 1.0, 1.0, 90.0, 150.0, 2.0]]);
        let (result, _) = pipeline(0.2).postprocess(&raw, ImageDimensions::new(400, 400));
        let d = &result.detections()[0];
        assert!((d.confidence - 1.5).abs() < 1e-12);
        assert_eq!(d.class_id, 2);
    }

    #[test]
    fn rows_with_unusable_class_ids_are_skipped() {
        let raw = RawOutput::from_rows(vec![
            vec![5.0, 5.0, 1.0, 1.0, 0.0, 0.9, f32::NAN],
            vec![5.0, 5.0, 1.0, 1.0, 0.0, 0.9, f32::INFINITY],
            vec![5.0, 5.0, 1.0, 1.0, 0.0, 0.9, 1e10],
        ]);
        let (result, stats) = pipeline(0.09).postprocess(&raw, ImageDimensions::new(400, 400));
        assert_eq!(result.darts_count(), 0);
        assert_eq!(stats.decode.skipped, 3);
        assert_eq!(stats.kept, 0);
    }

    #[test]
    fn detect_runs_end_to_end() {
        let backend = Canned(RawOutput::from_rows(vec![
            vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.4, 0.0],
            vec![2.0, 2.0, 1.0, 1.0, 0.0, 0.8, 1.0],
        ]));
        let png = create_test_png(100, 60);
        let result = pipeline(0.09).detect(&backend, &png).unwrap();

        assert_eq!(result.darts_count(), 2);
        assert_eq!(result.model_info().original_size, [100, 60]);
        assert_eq!(result.model_info().image_size, 32);
        assert_eq!(result.detections()[0].class_id, 1);
        // scale = 60 / 20 = 3
        assert!((result.detections()[0].x_center - 6.0).abs() < 1e-9);
    }

    #[test]
    fn respond_without_model_is_config_error() {
        let png = create_test_png(10, 10);
        let response = pipeline(0.09).respond::<Canned>(None, &png);
        match response {
            DetectionResponse::Error(body) => assert!(body.error.contains("ConfigError")),
            DetectionResponse::Detections(_) => panic!("expected error"),
        }
    }

    proptest! {
        #[test]
        fn postprocess_is_deterministic_and_ordered(
            rows in proptest::collection::vec(
                proptest::collection::vec(-50.0f32..150.0, 0..9),
                0..40,
            ),
            threshold in 0.0f64..0.99,
        ) {
            let raw = RawOutput::from_rows(rows);
            let p = pipeline(threshold);
            let size = ImageDimensions::new(640, 480);

            let (a, stats) = p.postprocess(&raw, size);
            let (b, _) = p.postprocess(&raw, size);
            prop_assert_eq!(&a, &b);

            prop_assert_eq!(a.darts_count(), a.detections().len());
            prop_assert_eq!(stats.kept + stats.below_threshold + stats.decode.skipped, raw.len());
            for (i, d) in a.detections().iter().enumerate() {
                prop_assert!(d.confidence > threshold);
                prop_assert_eq!(d.detection_index, i + 1);
                prop_assert_eq!(d.corners.len(), 4);
            }
            for pair in a.detections().windows(2) {
                prop_assert!(pair[0].confidence >= pair[1].confidence);
            }
        }
    }
}
