//! Segmentation strategy: class-agnostic masks filtered by ink color.
//!
//! A [`MaskGenerator`] proposes regions over the whole page without knowing
//! what a stamp is. The strategy keeps the masks whose covered pixels are, on
//! average, blue enough, and reports each as a candidate carrying its mask.
//!
//! The bundled generator, [`FastSamMaskGenerator`], runs a FastSAM-style
//! "segment everything" ONNX export: a detection head `[1, 4 + nc + nm, N]`
//! (center boxes, class scores, mask coefficients) and a prototype tensor
//! `[1, nm, h, w]`. Each mask is `sigmoid(coefficients . prototypes)`, cropped
//! to its box.

use super::DetectionStrategy;
use crate::core::config::{ConfigValidator, OrtSessionConfig};
use crate::core::errors::{StampError, StampResult};
use crate::core::inference::{OrtInfer, RawTensor};
use crate::core::validation::validate_page;
use crate::domain::{BoundingBox, Candidate, RegionMask, StrategyKind};
use crate::impl_config_validator;
use crate::processors::{
    InputTransform, ResizeMode, ScoredBox, fit_to_input, mask_bounding_box, non_max_suppression,
    to_nchw_tensor,
};
use crate::selection::rank_candidates;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

/// A mask placed on a page: a `width` x `height` boolean grid whose top-left
/// pixel sits at `(x_offset, y_offset)`.
///
/// Pixels outside the grid are not covered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMask {
    pub x_offset: u32,
    pub y_offset: u32,
    pub width: u32,
    pub height: u32,
    pub data: Vec<bool>,
}

impl PageMask {
    /// A mask spanning the whole page.
    pub fn full(width: u32, height: u32, data: Vec<bool>) -> StampResult<Self> {
        Self::at(0, 0, width, height, data)
    }

    /// A mask whose grid starts at `(x_offset, y_offset)`.
    pub fn at(
        x_offset: u32,
        y_offset: u32,
        width: u32,
        height: u32,
        data: Vec<bool>,
    ) -> StampResult<Self> {
        if data.len() != width as usize * height as usize {
            return Err(StampError::invalid_input(format!(
                "mask data length {} does not match {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            x_offset,
            y_offset,
            width,
            height,
            data,
        })
    }
}

/// Proposes class-agnostic region masks over a page.
pub trait MaskGenerator: Send + Sync + Debug {
    /// Generates masks for `page`, in any order.
    fn generate(&self, page: &RgbImage) -> StampResult<Vec<PageMask>>;
}

/// Parameters of the segmentation strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// A mask is kept when the mean blue value of its pixels is strictly
    /// greater than this.
    pub color_threshold: f32,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            color_threshold: 150.0,
        }
    }
}

impl_config_validator!(SegmentationConfig {
    color_threshold: range(0.0, 255.0),
});

/// Finds stamps among generic segmentation masks.
#[derive(Debug, Clone)]
pub struct SegmentationStrategy {
    config: SegmentationConfig,
    generator: Arc<dyn MaskGenerator>,
}

impl SegmentationStrategy {
    pub fn new(config: SegmentationConfig, generator: Arc<dyn MaskGenerator>) -> StampResult<Self> {
        config.validate()?;
        Ok(Self { config, generator })
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Converts one mask into a candidate, or `None` when the mask is empty,
    /// falls off the page, or is not blue enough.
    fn mask_to_candidate(
        &self,
        page: &RgbImage,
        mask: &PageMask,
    ) -> StampResult<Option<Candidate>> {
        let (page_w, page_h) = page.dimensions();
        // Clip the grid to the page before measuring anything.
        let x_end = mask.x_offset.saturating_add(mask.width).min(page_w);
        let y_end = mask.y_offset.saturating_add(mask.height).min(page_h);
        if mask.x_offset >= x_end || mask.y_offset >= y_end {
            return Ok(None);
        }
        let clip_w = x_end - mask.x_offset;
        let clip_h = y_end - mask.y_offset;

        let mut clipped = Vec::with_capacity(clip_w as usize * clip_h as usize);
        let mut blue_sum = 0u64;
        let mut covered = 0u64;
        for y in 0..clip_h {
            let row = (y * mask.width) as usize;
            for x in 0..clip_w {
                let set = mask.data.get(row + x as usize).copied().unwrap_or(false);
                if set {
                    let pixel = page.get_pixel(mask.x_offset + x, mask.y_offset + y);
                    blue_sum += pixel.0[2] as u64;
                    covered += 1;
                }
                clipped.push(set);
            }
        }
        if covered == 0 {
            return Ok(None);
        }

        let mean_blue = (blue_sum as f64 / covered as f64) as f32;
        if mean_blue <= self.config.color_threshold {
            return Ok(None);
        }

        let Some(local) = mask_bounding_box(&clipped, clip_w, clip_h) else {
            return Ok(None);
        };
        let mut region = Vec::with_capacity(local.area() as usize);
        for y in local.y_min()..local.y_max() {
            let row = (y * clip_w) as usize;
            let (start, end) = (row + local.x_min() as usize, row + local.x_max() as usize);
            region.extend_from_slice(&clipped[start..end]);
        }

        let bbox = BoundingBox::new(
            local.x_min() + mask.x_offset,
            local.y_min() + mask.y_offset,
            local.x_max() + mask.x_offset,
            local.y_max() + mask.y_offset,
        )?;
        let region = RegionMask::new(bbox.width(), bbox.height(), region)?;
        Candidate::new(bbox, mean_blue, StrategyKind::Segmentation)?
            .with_mask(region)
            .map(Some)
    }
}

impl DetectionStrategy for SegmentationStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Segmentation
    }

    fn detect(&self, page: &RgbImage) -> StampResult<Vec<Candidate>> {
        validate_page(page)?;
        let masks = self.generator.generate(page)?;
        let total = masks.len();

        let mut candidates = Vec::new();
        for mask in &masks {
            if let Some(candidate) = self.mask_to_candidate(page, mask)? {
                candidates.push(candidate);
            }
        }

        tracing::debug!(
            masks = total,
            kept = candidates.len(),
            color_threshold = self.config.color_threshold,
            "segmentation detection finished"
        );
        Ok(rank_candidates(candidates))
    }
}

/// Settings for the FastSAM ONNX mask generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastSamConfig {
    pub model_path: PathBuf,
    /// Square network input side.
    #[serde(default = "FastSamConfig::default_input_size")]
    pub input_size: u32,
    /// Minimum detection confidence.
    #[serde(default = "FastSamConfig::default_confidence")]
    pub confidence_threshold: f32,
    /// IoU above which overlapping masks are suppressed.
    #[serde(default = "FastSamConfig::default_iou")]
    pub iou_threshold: f32,
    /// Sigmoid level above which a pixel belongs to the mask.
    #[serde(default = "FastSamConfig::default_mask_threshold")]
    pub mask_threshold: f32,
    #[serde(default)]
    pub resize_mode: ResizeMode,
    #[serde(default)]
    pub session: Option<OrtSessionConfig>,
}

impl FastSamConfig {
    fn default_input_size() -> u32 {
        1024
    }
    fn default_confidence() -> f32 {
        0.4
    }
    fn default_iou() -> f32 {
        0.9
    }
    fn default_mask_threshold() -> f32 {
        0.5
    }

    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            input_size: Self::default_input_size(),
            confidence_threshold: Self::default_confidence(),
            iou_threshold: Self::default_iou(),
            mask_threshold: Self::default_mask_threshold(),
            resize_mode: ResizeMode::default(),
            session: None,
        }
    }
}

impl Default for FastSamConfig {
    fn default() -> Self {
        Self::new("models/FastSAM-s.onnx")
    }
}

impl_config_validator!(FastSamConfig {
    input_size: range(32, 4096),
    confidence_threshold: range(0.0, 1.0),
    iou_threshold: range(0.0, 1.0),
    mask_threshold: range(0.0, 1.0),
});

/// "Segment everything" mask generator backed by a FastSAM ONNX export.
#[derive(Debug)]
pub struct FastSamMaskGenerator {
    inference: OrtInfer,
    config: FastSamConfig,
}

impl FastSamMaskGenerator {
    /// Loads the model; a missing or unloadable file is a configuration error.
    pub fn new(config: FastSamConfig) -> StampResult<Self> {
        config.validate()?;
        let inference = OrtInfer::new(&config.model_path, config.session.as_ref())?;
        Ok(Self { inference, config })
    }
}

impl MaskGenerator for FastSamMaskGenerator {
    fn generate(&self, page: &RgbImage) -> StampResult<Vec<PageMask>> {
        let (input, transform) =
            fit_to_input(page, self.config.input_size, self.config.resize_mode);
        let outputs = self.inference.run(&to_nchw_tensor(&input))?;
        decode_fastsam_outputs(
            &outputs,
            &transform,
            page.dimensions(),
            &self.config,
            self.inference.model_name(),
        )
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Decodes FastSAM outputs into page masks.
///
/// The 3-D output is the detection head, the 4-D output the prototypes;
/// their order in the session does not matter.
pub fn decode_fastsam_outputs(
    outputs: &[RawTensor],
    transform: &InputTransform,
    page_size: (u32, u32),
    config: &FastSamConfig,
    model_name: &str,
) -> StampResult<Vec<PageMask>> {
    let find = |rank: usize| {
        outputs
            .iter()
            .find(|t| t.shape.len() == rank)
            .and_then(|t| t.dims().map(|dims| (t, dims)))
    };
    let (det, det_dims) = find(3).ok_or_else(|| {
        StampError::output_shape(
            model_name,
            "[1, 4 + nc + nm, N] detections",
            outputs.first().map(|t| t.shape.as_slice()).unwrap_or(&[]),
        )
    })?;
    let (proto, proto_dims) = find(4).ok_or_else(|| {
        StampError::output_shape(model_name, "[1, nm, h, w] prototypes", &det.shape)
    })?;

    let (channels, anchors) = (det_dims[1], det_dims[2]);
    let (nm, proto_h, proto_w) = (proto_dims[1], proto_dims[2], proto_dims[3]);
    if channels < 5 + nm
        || proto_h == 0
        || proto_w == 0
        || det.data.len() < channels * anchors
        || proto.data.len() < nm * proto_h * proto_w
    {
        return Err(StampError::output_shape(
            model_name,
            format!("detection channels >= {} with non-empty prototypes", 5 + nm),
            &det.shape,
        ));
    }
    let num_classes = channels - 4 - nm;
    let at = |c: usize, i: usize| det.data[c * anchors + i];

    let mut boxes = Vec::new();
    let mut anchor_ids = Vec::new();
    for i in 0..anchors {
        let score = (0..num_classes)
            .map(|c| at(4 + c, i))
            .fold(f32::NEG_INFINITY, f32::max);
        if score > config.confidence_threshold {
            boxes.push(ScoredBox::from_center(at(0, i), at(1, i), at(2, i), at(3, i), score, 0));
            anchor_ids.push(i);
        }
    }
    let kept = non_max_suppression(&boxes, config.iou_threshold);

    let (page_w, page_h) = page_size;
    let input_size = config.input_size as f32;
    let plane = proto_h * proto_w;
    let mut masks = Vec::with_capacity(kept.len());

    for idx in kept {
        let (sb, anchor) = (boxes[idx], anchor_ids[idx]);
        let coeffs: Vec<f32> = (0..nm).map(|k| at(4 + num_classes + k, anchor)).collect();

        let x_start = (transform.page_x(sb.x1).floor().max(0.0) as u32).min(page_w);
        let y_start = (transform.page_y(sb.y1).floor().max(0.0) as u32).min(page_h);
        let x_end = (transform.page_x(sb.x2).ceil().max(0.0) as u32).min(page_w);
        let y_end = (transform.page_y(sb.y2).ceil().max(0.0) as u32).min(page_h);
        if x_start >= x_end || y_start >= y_end {
            continue;
        }

        let (width, height) = (x_end - x_start, y_end - y_start);
        let mut data = vec![false; width as usize * height as usize];
        for y in 0..height {
            let iy = (y_start + y) as f32 + 0.5;
            let iy = iy * transform.scale_y + transform.pad_y;
            if iy < sb.y1 || iy >= sb.y2 {
                continue;
            }
            let py = ((iy * proto_h as f32 / input_size) as usize).min(proto_h - 1);
            for x in 0..width {
                let ix = ((x_start + x) as f32 + 0.5) * transform.scale_x + transform.pad_x;
                if ix < sb.x1 || ix >= sb.x2 {
                    continue;
                }
                let px = ((ix * proto_w as f32 / input_size) as usize).min(proto_w - 1);
                let logit: f32 = coeffs
                    .iter()
                    .enumerate()
                    .map(|(k, c)| c * proto.data[k * plane + py * proto_w + px])
                    .sum();
                if sigmoid(logit) > config.mask_threshold {
                    data[(y * width + x) as usize] = true;
                }
            }
        }
        masks.push(PageMask::at(x_start, y_start, width, height, data)?);
    }

    tracing::debug!(
        model = model_name,
        anchors,
        masks = masks.len(),
        "decoded segmentation masks"
    );
    Ok(masks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[derive(Debug)]
    struct FixedMasks(Vec<PageMask>);

    impl MaskGenerator for FixedMasks {
        fn generate(&self, _page: &RgbImage) -> StampResult<Vec<PageMask>> {
            Ok(self.0.clone())
        }
    }

    fn rect_mask(page_w: u32, page_h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> PageMask {
        let mut data = vec![false; (page_w * page_h) as usize];
        for y in y0..y1 {
            for x in x0..x1 {
                data[(y * page_w + x) as usize] = true;
            }
        }
        PageMask::full(page_w, page_h, data).unwrap()
    }

    fn two_color_page() -> RgbImage {
        let mut page = RgbImage::from_pixel(40, 40, Rgb([240, 240, 240]));
        for y in 5..15 {
            for x in 5..20 {
                page.put_pixel(x, y, Rgb([20, 40, 220]));
            }
        }
        for y in 25..35 {
            for x in 25..35 {
                page.put_pixel(x, y, Rgb([200, 30, 30]));
            }
        }
        page
    }

    fn strategy(masks: Vec<PageMask>) -> SegmentationStrategy {
        SegmentationStrategy::new(SegmentationConfig::default(), Arc::new(FixedMasks(masks)))
            .unwrap()
    }

    #[test]
    fn test_blue_mask_kept_red_mask_dropped() {
        let page = two_color_page();
        let strategy = strategy(vec![
            rect_mask(40, 40, 5, 5, 20, 15),
            rect_mask(40, 40, 25, 25, 35, 35),
        ]);
        let candidates = strategy.detect(&page).unwrap();
        assert_eq!(candidates.len(), 1);
        let candidate = &candidates[0];
        assert_eq!(candidate.bbox.to_tuple(), (5, 5, 20, 15));
        assert_eq!(candidate.score, 220.0);
        assert_eq!(candidate.source, StrategyKind::Segmentation);
        let mask = candidate.mask.as_ref().unwrap();
        assert_eq!((mask.width(), mask.height()), (15, 10));
        assert_eq!(mask.count(), 150);
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut page = RgbImage::new(10, 10);
        for pixel in page.pixels_mut() {
            *pixel = Rgb([0, 0, 150]);
        }
        let strategy = strategy(vec![rect_mask(10, 10, 0, 0, 5, 5)]);
        assert!(strategy.detect(&page).unwrap().is_empty());
    }

    #[test]
    fn test_empty_and_offpage_masks_skipped() {
        let page = two_color_page();
        let empty = PageMask::full(40, 40, vec![false; 1600]).unwrap();
        let offpage = PageMask::at(100, 100, 2, 2, vec![true; 4]).unwrap();
        assert!(strategy(vec![empty, offpage]).detect(&page).unwrap().is_empty());
    }

    #[test]
    fn test_offset_mask_bbox_in_page_coordinates() {
        let page = two_color_page();
        let mut data = vec![false; 20 * 20];
        for y in 2..8 {
            for x in 3..12 {
                data[y * 20 + x] = true;
            }
        }
        let mask = PageMask::at(4, 4, 20, 20, data).unwrap();
        let candidates = strategy(vec![mask]).detect(&page).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].bbox.to_tuple(), (7, 6, 16, 12));
    }

    #[test]
    fn test_page_mask_length_checked() {
        assert!(PageMask::full(3, 3, vec![true; 8]).is_err());
    }

    fn fastsam_outputs(anchors: &[([f32; 4], f32, f32)]) -> Vec<RawTensor> {
        let nm = 32;
        let channels = 5 + nm;
        let n = anchors.len();
        let mut det = vec![0.0f32; channels * n];
        for (i, (bbox, conf, coeff0)) in anchors.iter().enumerate() {
            for (c, v) in bbox.iter().enumerate() {
                det[c * n + i] = *v;
            }
            det[4 * n + i] = *conf;
            det[5 * n + i] = *coeff0;
        }
        let mut protos = vec![0.0f32; nm * 4 * 4];
        for v in protos.iter_mut().take(16) {
            *v = 5.0;
        }
        vec![
            RawTensor {
                shape: vec![1, channels as i64, n as i64],
                data: det,
            },
            RawTensor {
                shape: vec![1, nm as i64, 4, 4],
                data: protos,
            },
        ]
    }

    fn identity() -> InputTransform {
        InputTransform {
            scale_x: 1.0,
            scale_y: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        }
    }

    fn small_config() -> FastSamConfig {
        FastSamConfig {
            input_size: 8,
            ..FastSamConfig::new("unused.onnx")
        }
    }

    fn decode(outputs: &[RawTensor]) -> StampResult<Vec<PageMask>> {
        decode_fastsam_outputs(outputs, &identity(), (8, 8), &small_config(), "fastsam")
    }

    #[test]
    fn test_decode_crops_mask_to_box() {
        let outputs = fastsam_outputs(&[
            ([4.0, 4.0, 4.0, 4.0], 0.9, 1.0),
            ([4.0, 4.0, 2.0, 2.0], 0.1, 1.0),
        ]);
        let masks = decode(&outputs).unwrap();
        assert_eq!(masks.len(), 1);
        let mask = &masks[0];
        let placed =
            BoundingBox::from_xywh(mask.x_offset, mask.y_offset, mask.width, mask.height).unwrap();
        let expected = BoundingBox::new(2, 2, 6, 6).unwrap();
        assert!(placed.iou(&expected) > 0.9, "mask placed at {placed}");
        assert_eq!(mask.data.iter().filter(|v| **v).count() as u64, placed.area());
    }

    #[test]
    fn test_decode_negative_logits_give_empty_mask() {
        let outputs = fastsam_outputs(&[([4.0, 4.0, 4.0, 4.0], 0.9, -1.0)]);
        let masks = decode(&outputs).unwrap();
        assert_eq!(masks.len(), 1);
        assert!(masks[0].data.iter().all(|v| !v));
    }

    #[test]
    fn test_decode_rejects_missing_prototypes() {
        let mut outputs = fastsam_outputs(&[([4.0, 4.0, 4.0, 4.0], 0.9, 1.0)]);
        outputs.pop();
        let err = decode(&outputs).unwrap_err();
        assert!(matches!(err, StampError::OutputShape { .. }));
    }

    #[test]
    fn test_generator_missing_model_is_model_load_error() {
        let err = FastSamMaskGenerator::new(FastSamConfig::new("/nonexistent/fastsam.onnx"))
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
