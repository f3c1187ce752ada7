use std::sync::atomic::{AtomicUsize, Ordering};

use dart_vision::{
    DartPipeline, DetectionResponse, DetectorConfig, ImageDimensions, InferenceBackend,
    InferenceError, RawOutput,
};
use image::{ExtendedColorType, ImageEncoder};
use ndarray::ArrayView4;

/// Hands back the same rows for every call and records what it was fed.
struct MockBackend {
    output: RawOutput,
    calls: AtomicUsize,
}

impl MockBackend {
    fn new(rows: Vec<Vec<f32>>) -> Self {
        Self {
            output: RawOutput::from_rows(rows),
            calls: AtomicUsize::new(0),
        }
    }
}

impl InferenceBackend for MockBackend {
    fn input_tensor_name(&self) -> &str {
        "images"
    }

    fn run(&self, input: ArrayView4<'_, f32>) -> Result<RawOutput, InferenceError> {
        assert_eq!(input.shape(), &[1, 3, 64, 64]);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

struct FailingBackend;

impl InferenceBackend for FailingBackend {
    fn input_tensor_name(&self) -> &str {
        "images"
    }

    fn run(&self, _input: ArrayView4<'_, f32>) -> Result<RawOutput, InferenceError> {
        Err(InferenceError::backend("device lost: /dev/dri/renderD128"))
    }
}

fn png(width: u32, height: u32) -> Vec<u8> {
    use image::{ImageBuffer, Rgb};
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
        ImageBuffer::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
    let mut buffer = Vec::new();
    image::codecs::png::PngEncoder::new(&mut buffer)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    buffer
}

fn pipeline(threshold: f64) -> DartPipeline {
    DartPipeline::new(DetectorConfig {
        image_size: 64,
        confidence_threshold: threshold,
        scale_calibration_divisor: 20.0,
        model_name: "YOLO11n-OBB".into(),
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn landscape_image_single_dart() {
    let backend = MockBackend::new(vec![vec![10.0, 10.0, 4.0, 2.0, 0.0, 0.5, 0.0]]);
    let result = pipeline(0.09).detect(&backend, &png(2000, 1000)).unwrap();

    assert_eq!(result.darts_count(), 1);
    let d = &result.detections()[0];
    assert_eq!((d.x_center, d.y_center), (500.0, 500.0));
    assert_eq!((d.width, d.height), (200.0, 100.0));
    assert_eq!(
        d.corners,
        [[400.0, 450.0], [600.0, 450.0], [600.0, 550.0], [400.0, 550.0]]
    );
    assert_eq!((d.bbox.x1, d.bbox.y1, d.bbox.x2, d.bbox.y2), (400.0, 450.0, 600.0, 550.0));
    assert_eq!(d.detection_index, 1);

    let info = result.model_info();
    assert_eq!(info.model, "YOLO11n-OBB");
    assert_eq!(info.image_size, 64);
    assert_eq!(info.original_size, [2000, 1000]);
}

#[test]
fn percent_scale_score_is_divided_once_and_kept() {
    let backend = MockBackend::new(vec![vec![5.0, 5.0, 1.0, 1.0, 90.0, 150.0, 2.0]]);
    let result = pipeline(0.2).detect(&backend, &png(100, 100)).unwrap();

    assert_eq!(result.darts_count(), 1);
    let d = &result.detections()[0];
    assert!((d.confidence - 1.5).abs() < 1e-12);
    assert_eq!(d.class_id, 2);
    assert_eq!(d.angle, 90.0);
}

#[test]
fn empty_output_is_an_empty_result() {
    let backend = MockBackend::new(vec![]);
    let response = pipeline(0.09).respond(Some(&backend), &png(50, 50));

    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["detections"], serde_json::json!([]));
    assert_eq!(value["darts_count"], 0);
    assert!(value.get("error").is_none());
}

#[test]
fn short_rows_are_skipped_not_fatal() {
    let backend = MockBackend::new(vec![
        vec![1.0, 2.0, 3.0, 4.0],
        vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.7],
    ]);
    let response = pipeline(0.09).respond(Some(&backend), &png(40, 40));

    match response {
        DetectionResponse::Detections(result) => {
            assert_eq!(result.darts_count(), 1);
            assert_eq!(result.detections()[0].class_id, 0);
        }
        DetectionResponse::Error(e) => panic!("unexpected error: {}", e.error),
    }
}

#[test]
fn only_short_rows_still_succeeds() {
    let backend = MockBackend::new(vec![vec![1.0, 2.0, 3.0, 4.0]]);
    let result = pipeline(0.09).detect(&backend, &png(40, 40)).unwrap();
    assert_eq!(result.darts_count(), 0);
}

#[test]
fn invalid_image_bytes_yield_error_only() {
    let backend = MockBackend::new(vec![vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.9]]);
    let response = pipeline(0.09).respond(Some(&backend), b"definitely not an image");

    let value = serde_json::to_value(&response).unwrap();
    let obj = value.as_object().unwrap();
    assert_eq!(obj.len(), 1);
    assert!(obj["error"].as_str().unwrap().contains("DecodeError"));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn inference_failure_is_opaque() {
    let response = pipeline(0.09).respond(Some(&FailingBackend), &png(20, 20));
    match response {
        DetectionResponse::Error(body) => {
            assert!(body.error.contains("InferenceError"));
            assert!(!body.error.contains("renderD128"));
        }
        DetectionResponse::Detections(_) => panic!("expected error"),
    }
}

#[test]
fn missing_model_is_config_error() {
    let response = pipeline(0.09).respond::<MockBackend>(None, &png(20, 20));
    assert!(response.is_error());
}

#[test]
fn ranks_by_confidence_and_filters_threshold() {
    let backend = MockBackend::new(vec![
        vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.30, 0.0],
        vec![2.0, 2.0, 1.0, 1.0, 0.0, 0.05, 1.0],
        vec![3.0, 3.0, 1.0, 1.0, 0.0, 95.0, 2.0],
        vec![4.0, 4.0, 1.0, 1.0, 0.0, 0.60, 3.0],
        vec![5.0, 5.0, 1.0, 1.0, 0.0, 0.30, 4.0],
    ]);
    let result = pipeline(0.1).detect(&backend, &png(200, 200)).unwrap();

    let classes: Vec<_> = result.detections().iter().map(|d| d.class_id).collect();
    assert_eq!(classes, vec![2, 3, 0, 4]);
    let indices: Vec<_> = result.detections().iter().map(|d| d.detection_index).collect();
    assert_eq!(indices, vec![1, 2, 3, 4]);
    assert!(result.detections().iter().all(|d| d.confidence > 0.1));
}

#[test]
fn repeated_runs_are_identical() {
    let rows = vec![
        vec![3.3, 7.1, 0.4, 2.2, 33.0, 0.71, 0.0],
        vec![9.9, 1.2, 0.3, 1.8, -12.5, 0.44, 0.0],
        vec![14.0, 2.0, 0.2, 2.1, 180.0, 12.0, 1.0],
    ];
    let backend = MockBackend::new(rows.clone());
    let image = png(320, 240);
    let p = pipeline(0.09);

    let a = serde_json::to_string(&p.respond(Some(&backend), &image)).unwrap();
    let b = serde_json::to_string(&p.respond(Some(&backend), &image)).unwrap();
    assert_eq!(a, b);

    let (direct, _) = p.postprocess(&RawOutput::from_rows(rows), ImageDimensions::new(320, 240));
    assert_eq!(serde_json::to_string(&DetectionResponse::Detections(direct)).unwrap(), a);
}
