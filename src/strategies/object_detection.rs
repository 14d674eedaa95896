//! Object-detection strategy: a trained detector filtered by class.
//!
//! The [`ObjectDetector`] trait isolates model output layouts from the
//! strategy. [`OnnxObjectDetector`] understands two layouts:
//!
//! - YOLO heads, `[1, 4 + num_classes, anchors]`: center boxes followed by
//!   one score per class; each anchor reports its best class.
//! - Box lists, `[N, 6]` or `[1, N, 6]`: rows of
//!   `[class_id, score, x1, y1, x2, y2]` as produced by RT-DETR exports.
//!
//! Both are mapped back to page pixels before the strategy sees them. The
//! strategy keeps the target class, applies the score threshold and NMS, and
//! clamps the surviving boxes to the page.

use super::DetectionStrategy;
use crate::core::config::{ConfigValidator, OrtSessionConfig};
use crate::core::errors::{StampError, StampResult};
use crate::core::inference::{OrtInfer, RawTensor};
use crate::core::validation::validate_page;
use crate::domain::{BoundingBox, Candidate, StrategyKind};
use crate::impl_config_validator;
use crate::processors::{
    InputTransform, ResizeMode, ScoredBox, fit_to_input, non_max_suppression, to_nchw_tensor,
};
use crate::selection::rank_candidates;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

/// One detection in page pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
    pub class_id: usize,
}

/// Everything a detector reports for one page.
pub type DetectorOutput = Vec<RawDetection>;

/// A trained detector producing class-labelled boxes in one pass.
pub trait ObjectDetector: Send + Sync + Debug {
    fn detect(&self, page: &RgbImage) -> StampResult<DetectorOutput>;
}

/// Parameters of the object-detection strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectDetectionConfig {
    /// Class id of the stamp class.
    pub target_class: usize,
    /// Minimum confidence for a detection to become a candidate.
    pub score_threshold: f32,
    /// IoU above which overlapping stamp boxes are suppressed.
    pub nms_threshold: f32,
}

impl Default for ObjectDetectionConfig {
    fn default() -> Self {
        Self {
            target_class: 0,
            score_threshold: 0.25,
            nms_threshold: 0.45,
        }
    }
}

impl_config_validator!(ObjectDetectionConfig {
    score_threshold: range(0.0, 1.0),
    nms_threshold: range(0.0, 1.0),
});

/// Finds stamps with a trained detector.
#[derive(Debug, Clone)]
pub struct ObjectDetectionStrategy {
    config: ObjectDetectionConfig,
    detector: Arc<dyn ObjectDetector>,
}

impl ObjectDetectionStrategy {
    pub fn new(
        config: ObjectDetectionConfig,
        detector: Arc<dyn ObjectDetector>,
    ) -> StampResult<Self> {
        config.validate()?;
        Ok(Self { config, detector })
    }

    pub fn config(&self) -> &ObjectDetectionConfig {
        &self.config
    }
}

impl DetectionStrategy for ObjectDetectionStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ObjectDetection
    }

    fn detect(&self, page: &RgbImage) -> StampResult<Vec<Candidate>> {
        validate_page(page)?;
        let (width, height) = page.dimensions();
        let detections = self.detector.detect(page)?;
        let total = detections.len();

        let boxes: Vec<ScoredBox> = detections
            .iter()
            .filter(|d| d.class_id == self.config.target_class)
            .filter(|d| d.score.is_finite() && d.score >= self.config.score_threshold)
            .map(|d| ScoredBox {
                x1: d.x1,
                y1: d.y1,
                x2: d.x2,
                y2: d.y2,
                score: d.score,
                class_id: d.class_id,
            })
            .collect();

        let mut candidates = Vec::new();
        for idx in non_max_suppression(&boxes, self.config.nms_threshold) {
            let sb = boxes[idx];
            let Some((bbox, clamped)) =
                BoundingBox::from_f32_clamped(sb.x1, sb.y1, sb.x2, sb.y2, width, height)
            else {
                tracing::debug!(score = sb.score, "detection lies outside the page, skipped");
                continue;
            };
            if clamped {
                tracing::debug!(%bbox, "detection clamped to page");
            }
            candidates.push(Candidate::new(bbox, sb.score, StrategyKind::ObjectDetection)?);
        }

        tracing::debug!(
            detections = total,
            kept = candidates.len(),
            target_class = self.config.target_class,
            "object detection finished"
        );
        Ok(rank_candidates(candidates))
    }
}

/// Output tensor layout of a detection model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLayout {
    /// Pick from the tensor shape.
    #[default]
    Auto,
    /// `[1, 4 + num_classes, anchors]`.
    Yolo,
    /// `[N, 6]` rows of `[class_id, score, x1, y1, x2, y2]`.
    BoxList,
}

impl OutputLayout {
    /// Resolves `Auto` against a concrete output shape.
    ///
    /// A trailing dimension of 6 means a box list unless the tensor is a
    /// YOLO head whose anchor axis happens to be 6 wide as well.
    pub fn resolve(self, dims: &[usize]) -> OutputLayout {
        match self {
            OutputLayout::Auto => match dims {
                [_, 6] => OutputLayout::BoxList,
                [1, c, 6] if *c != 6 => OutputLayout::BoxList,
                _ => OutputLayout::Yolo,
            },
            other => other,
        }
    }
}

/// Settings for the ONNX detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnnxObjectDetectorConfig {
    pub model_path: PathBuf,
    #[serde(default = "OnnxObjectDetectorConfig::default_input_size")]
    pub input_size: u32,
    #[serde(default)]
    pub layout: OutputLayout,
    #[serde(default)]
    pub resize_mode: ResizeMode,
    #[serde(default)]
    pub session: Option<OrtSessionConfig>,
}

impl OnnxObjectDetectorConfig {
    fn default_input_size() -> u32 {
        640
    }

    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            input_size: Self::default_input_size(),
            layout: OutputLayout::default(),
            resize_mode: ResizeMode::default(),
            session: None,
        }
    }
}

impl Default for OnnxObjectDetectorConfig {
    fn default() -> Self {
        Self::new("models/stamp_detector.onnx")
    }
}

impl_config_validator!(OnnxObjectDetectorConfig {
    input_size: range(32, 4096),
});

/// ONNX Runtime backed [`ObjectDetector`].
#[derive(Debug)]
pub struct OnnxObjectDetector {
    inference: OrtInfer,
    config: OnnxObjectDetectorConfig,
}

impl OnnxObjectDetector {
    pub fn new(config: OnnxObjectDetectorConfig) -> StampResult<Self> {
        config.validate()?;
        let inference = OrtInfer::new(&config.model_path, config.session.as_ref())?;
        Ok(Self { inference, config })
    }
}

impl ObjectDetector for OnnxObjectDetector {
    fn detect(&self, page: &RgbImage) -> StampResult<DetectorOutput> {
        let (input, transform) =
            fit_to_input(page, self.config.input_size, self.config.resize_mode);
        let outputs = self.inference.run(&to_nchw_tensor(&input))?;
        let output = outputs.first().ok_or_else(|| {
            StampError::output_shape(self.inference.model_name(), "at least one output", &[])
        })?;
        decode_detections(output, self.config.layout, &transform, self.inference.model_name())
    }
}

/// Decodes a detection tensor into page-space detections.
pub fn decode_detections(
    output: &RawTensor,
    layout: OutputLayout,
    transform: &InputTransform,
    model_name: &str,
) -> StampResult<DetectorOutput> {
    let dims = output
        .dims()
        .ok_or_else(|| StampError::output_shape(model_name, "static dimensions", &output.shape))?;

    let to_page = |x1: f32, y1: f32, x2: f32, y2: f32, score: f32, class_id: usize| RawDetection {
        x1: transform.page_x(x1),
        y1: transform.page_y(y1),
        x2: transform.page_x(x2),
        y2: transform.page_y(y2),
        score,
        class_id,
    };

    match layout.resolve(&dims) {
        OutputLayout::Yolo => {
            let [1, channels, anchors] = dims[..] else {
                return Err(StampError::output_shape(
                    model_name,
                    "[1, 4 + num_classes, anchors]",
                    &output.shape,
                ));
            };
            if channels < 5 || output.data.len() < channels * anchors {
                return Err(StampError::output_shape(
                    model_name,
                    "at least one class channel",
                    &output.shape,
                ));
            }
            let at = |c: usize, i: usize| output.data[c * anchors + i];
            let detections = (0..anchors)
                .map(|i| {
                    let (class_id, score) = (0..channels - 4)
                        .map(|c| (c, at(4 + c, i)))
                        .fold((0, f32::NEG_INFINITY), |best, cur| {
                            if cur.1 > best.1 { cur } else { best }
                        });
                    let sb = ScoredBox::from_center(
                        at(0, i),
                        at(1, i),
                        at(2, i),
                        at(3, i),
                        score,
                        class_id,
                    );
                    to_page(sb.x1, sb.y1, sb.x2, sb.y2, score, class_id)
                })
                .collect();
            Ok(detections)
        }
        OutputLayout::BoxList | OutputLayout::Auto => {
            let rows = match dims[..] {
                [n, 6] | [1, n, 6] => n,
                _ => {
                    return Err(StampError::output_shape(
                        model_name,
                        "[N, 6] rows of [class_id, score, x1, y1, x2, y2]",
                        &output.shape,
                    ));
                }
            };
            let detections = output
                .data
                .chunks_exact(6)
                .take(rows)
                .filter(|row| row[0] >= 0.0)
                .map(|row| to_page(row[2], row[3], row[4], row[5], row[1], row[0].round() as usize))
                .collect();
            Ok(detections)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FixedDetections(Vec<RawDetection>);

    impl ObjectDetector for FixedDetections {
        fn detect(&self, _page: &RgbImage) -> StampResult<DetectorOutput> {
            Ok(self.0.clone())
        }
    }

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, score: f32, class_id: usize) -> RawDetection {
        RawDetection {
            x1,
            y1,
            x2,
            y2,
            score,
            class_id,
        }
    }

    fn strategy(detections: Vec<RawDetection>) -> ObjectDetectionStrategy {
        ObjectDetectionStrategy::new(
            ObjectDetectionConfig::default(),
            Arc::new(FixedDetections(detections)),
        )
        .unwrap()
    }

    /// Pixel box of a decoded detection on a 200x200 page.
    fn page_box(detection: &RawDetection) -> BoundingBox {
        let (bbox, _) = BoundingBox::from_f32_clamped(
            detection.x1,
            detection.y1,
            detection.x2,
            detection.y2,
            200,
            200,
        )
        .unwrap();
        bbox
    }

    fn assert_box_close(detection: &RawDetection, expected: (u32, u32, u32, u32)) {
        let (x_min, y_min, x_max, y_max) = expected;
        let expected = BoundingBox::new(x_min, y_min, x_max, y_max).unwrap();
        let iou = page_box(detection).iou(&expected);
        assert!(iou > 0.9, "{detection:?} vs {expected}: iou {iou}");
    }

    fn identity() -> InputTransform {
        InputTransform {
            scale_x: 1.0,
            scale_y: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        }
    }

    #[test]
    fn test_filters_class_and_score() {
        let page = RgbImage::new(200, 200);
        let candidates = strategy(vec![
            det(10.0, 10.0, 60.0, 60.0, 0.9, 0),
            det(100.0, 100.0, 150.0, 150.0, 0.95, 1),
            det(120.0, 10.0, 180.0, 60.0, 0.1, 0),
        ])
        .detect(&page)
        .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].bbox.to_tuple(), (10, 10, 60, 60));
        assert_eq!(candidates[0].score, 0.9);
        assert_eq!(candidates[0].source, StrategyKind::ObjectDetection);
    }

    #[test]
    fn test_overlaps_suppressed_and_boxes_clamped() {
        let page = RgbImage::new(100, 100);
        let candidates = strategy(vec![
            det(50.0, 50.0, 120.0, 120.0, 0.8, 0),
            det(52.0, 52.0, 118.0, 118.0, 0.7, 0),
            det(-5.0, 0.0, 20.0, 20.0, 0.6, 0),
        ])
        .detect(&page)
        .unwrap();
        let boxes: Vec<_> = candidates.iter().map(|c| c.bbox.to_tuple()).collect();
        assert_eq!(boxes, vec![(50, 50, 100, 100), (0, 0, 20, 20)]);
    }

    #[test]
    fn test_layout_resolution() {
        assert_eq!(OutputLayout::Auto.resolve(&[300, 6]), OutputLayout::BoxList);
        assert_eq!(OutputLayout::Auto.resolve(&[1, 300, 6]), OutputLayout::BoxList);
        assert_eq!(OutputLayout::Auto.resolve(&[1, 5, 8400]), OutputLayout::Yolo);
        assert_eq!(OutputLayout::Auto.resolve(&[1, 6, 8400]), OutputLayout::Yolo);
        assert_eq!(OutputLayout::Yolo.resolve(&[300, 6]), OutputLayout::Yolo);
    }

    #[test]
    fn test_decode_yolo_head() {
        // Two anchors, two classes: rows are cx, cy, w, h, class 0, class 1.
        let output = RawTensor {
            shape: vec![1, 6, 2],
            data: vec![
                50.0, 10.0, // cx
                40.0, 10.0, // cy
                20.0, 4.0, // w
                10.0, 4.0, // h
                0.9, 0.2, // class 0
                0.1, 0.7, // class 1
            ],
        };
        let transform = InputTransform {
            scale_x: 0.5,
            scale_y: 0.5,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        let detections =
            decode_detections(&output, OutputLayout::Yolo, &transform, "yolo").unwrap();
        assert_eq!(detections.len(), 2);
        assert_box_close(&detections[0], (80, 70, 120, 90));
        assert_eq!((detections[0].score, detections[0].class_id), (0.9, 0));
        assert_eq!(detections[1].class_id, 1);
        assert_eq!(detections[1].score, 0.7);
    }

    #[test]
    fn test_decode_box_list() {
        let output = RawTensor {
            shape: vec![2, 6],
            data: vec![
                0.0, 0.8, 10.0, 20.0, 30.0, 40.0, //
                -1.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            ],
        };
        let detections =
            decode_detections(&output, OutputLayout::Auto, &identity(), "rtdetr").unwrap();
        assert_eq!(detections.len(), 1);
        assert_box_close(&detections[0], (10, 20, 30, 40));
        assert_eq!((detections[0].score, detections[0].class_id), (0.8, 0));
    }

    #[test]
    fn test_decode_rejects_unknown_shape() {
        let output = RawTensor {
            shape: vec![2, 7],
            data: vec![0.0; 14],
        };
        let err = decode_detections(&output, OutputLayout::BoxList, &identity(), "m").unwrap_err();
        assert!(matches!(err, StampError::OutputShape { .. }));
    }

    #[test]
    fn test_missing_model_is_configuration_error() {
        let err = OnnxObjectDetector::new(OnnxObjectDetectorConfig::new("/nonexistent/yolo.onnx"))
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
