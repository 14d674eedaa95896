//! Candidate stamp regions.
//!
//! Every strategy, whatever its native output looks like, reports its
//! proposals as [`Candidate`] values so the selection policy and the engine
//! never have to know which model produced them.

use crate::core::errors::{StampError, StampResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies a detection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// HSV thresholding followed by morphology and contour analysis.
    ColorThreshold,
    /// Class-agnostic segmentation filtered by color statistics.
    Segmentation,
    /// Trained object detector filtered by class.
    ObjectDetection,
}

impl StrategyKind {
    /// All strategies in their canonical order.
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::ColorThreshold,
        StrategyKind::Segmentation,
        StrategyKind::ObjectDetection,
    ];

    /// Short stable name, used in logs and file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::ColorThreshold => "color_threshold",
            StrategyKind::Segmentation => "segmentation",
            StrategyKind::ObjectDetection => "object_detection",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = StampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "color" | "color_threshold" | "hsv" => Ok(StrategyKind::ColorThreshold),
            "segmentation" | "sam" | "fastsam" => Ok(StrategyKind::Segmentation),
            "object_detection" | "detection" | "yolo" => Ok(StrategyKind::ObjectDetection),
            other => Err(StampError::config_error(format!(
                "unknown strategy '{other}'"
            ))),
        }
    }
}

/// Axis-aligned pixel rectangle with exclusive max edges.
///
/// The constructor guarantees `x_min < x_max` and `y_min < y_max`, so every
/// box covers at least one pixel. Deserialization goes through the same
/// check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawBoundingBox")]
pub struct BoundingBox {
    x_min: u32,
    y_min: u32,
    x_max: u32,
    y_max: u32,
}

#[derive(Deserialize)]
struct RawBoundingBox {
    x_min: u32,
    y_min: u32,
    x_max: u32,
    y_max: u32,
}

impl TryFrom<RawBoundingBox> for BoundingBox {
    type Error = StampError;

    fn try_from(raw: RawBoundingBox) -> StampResult<Self> {
        Self::new(raw.x_min, raw.y_min, raw.x_max, raw.y_max)
    }
}

impl BoundingBox {
    /// Creates a box from its corners, rejecting empty or inverted boxes.
    pub fn new(x_min: u32, y_min: u32, x_max: u32, y_max: u32) -> StampResult<Self> {
        if x_min >= x_max || y_min >= y_max {
            return Err(StampError::invalid_input(format!(
                "empty bounding box ({x_min}, {y_min}, {x_max}, {y_max})"
            )));
        }
        Ok(Self {
            x_min,
            y_min,
            x_max,
            y_max,
        })
    }

    /// Creates a box from an origin and a size (OpenCV `boundingRect` style).
    pub fn from_xywh(x: u32, y: u32, width: u32, height: u32) -> StampResult<Self> {
        Self::new(x, y, x.saturating_add(width), y.saturating_add(height))
    }

    /// Converts floating point model coordinates into a pixel box inside a
    /// `width` x `height` image.
    ///
    /// Mins are floored and maxes ceiled before clamping. Returns the box and
    /// whether clamping changed it, or `None` when nothing of the box lies
    /// inside the image.
    pub fn from_f32_clamped(
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        width: u32,
        height: u32,
    ) -> Option<(Self, bool)> {
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            return None;
        }
        let (x1, x2) = (x1.min(x2), x1.max(x2));
        let (y1, y2) = (y1.min(y2), y1.max(y2));
        let clamp = |v: f32, max: u32| v.clamp(0.0, max as f32) as u32;

        let bx_min = clamp(x1.floor(), width);
        let by_min = clamp(y1.floor(), height);
        let bx_max = clamp(x2.ceil(), width);
        let by_max = clamp(y2.ceil(), height);
        let clamped = x1.floor() < 0.0
            || y1.floor() < 0.0
            || x2.ceil() > width as f32
            || y2.ceil() > height as f32;

        Self::new(bx_min, by_min, bx_max, by_max)
            .ok()
            .map(|bbox| (bbox, clamped))
    }

    /// Left edge (inclusive).
    pub fn x_min(&self) -> u32 {
        self.x_min
    }

    /// Top edge (inclusive).
    pub fn y_min(&self) -> u32 {
        self.y_min
    }

    /// Right edge (exclusive).
    pub fn x_max(&self) -> u32 {
        self.x_max
    }

    /// Bottom edge (exclusive).
    pub fn y_max(&self) -> u32 {
        self.y_max
    }

    /// Box width in pixels.
    pub fn width(&self) -> u32 {
        self.x_max - self.x_min
    }

    /// Box height in pixels.
    pub fn height(&self) -> u32 {
        self.y_max - self.y_min
    }

    /// Box area in pixels; always at least 1.
    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Corner tuple `(x_min, y_min, x_max, y_max)`.
    pub fn to_tuple(&self) -> (u32, u32, u32, u32) {
        (self.x_min, self.y_min, self.x_max, self.y_max)
    }

    /// Area of the overlap with another box.
    pub fn intersection_area(&self, other: &BoundingBox) -> u64 {
        let x1 = self.x_min.max(other.x_min);
        let y1 = self.y_min.max(other.y_min);
        let x2 = self.x_max.min(other.x_max);
        let y2 = self.y_max.min(other.y_max);
        if x2 <= x1 || y2 <= y1 {
            0
        } else {
            (x2 - x1) as u64 * (y2 - y1) as u64
        }
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;
        intersection as f32 / union as f32
    }

    /// Clamps the box to a `width` x `height` image.
    ///
    /// Returns the clamped box and whether clamping changed it, or `None`
    /// when the box lies entirely outside the image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(Self, bool)> {
        let clamped = Self::new(
            self.x_min.min(width),
            self.y_min.min(height),
            self.x_max.min(width),
            self.y_max.min(height),
        )
        .ok()?;
        Some((clamped, clamped != *self))
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.x_min, self.y_min, self.x_max, self.y_max
        )
    }
}

/// Boolean per-pixel mask covering exactly a candidate's bounding box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionMask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

impl RegionMask {
    /// Creates a mask from row-major data.
    pub fn new(width: u32, height: u32, data: Vec<bool>) -> StampResult<Self> {
        if data.len() != width as usize * height as usize {
            return Err(StampError::invalid_input(format!(
                "mask data length {} does not match {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Mask width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Mask height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether the pixel at `(x, y)` (relative to the box origin) is set.
    pub fn get(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.data[(y * self.width + x) as usize]
    }

    /// Number of set pixels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// Row-major mask data.
    pub fn as_slice(&self) -> &[bool] {
        &self.data
    }
}

/// A single stamp-region proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Region in page pixel coordinates.
    pub bbox: BoundingBox,
    /// Strategy-specific score; higher is better.
    pub score: f32,
    /// Pixel mask over `bbox`, only produced by segmentation.
    pub mask: Option<RegionMask>,
    /// The strategy that produced this candidate.
    pub source: StrategyKind,
}

impl Candidate {
    /// Creates a candidate, rejecting negative or non-finite scores.
    pub fn new(bbox: BoundingBox, score: f32, source: StrategyKind) -> StampResult<Self> {
        if !score.is_finite() || score < 0.0 {
            return Err(StampError::invalid_input(format!(
                "candidate score must be a non-negative number, got {score}"
            )));
        }
        Ok(Self {
            bbox,
            score,
            mask: None,
            source,
        })
    }

    /// Attaches a mask; its size must match the bounding box.
    pub fn with_mask(mut self, mask: RegionMask) -> StampResult<Self> {
        if mask.width() != self.bbox.width() || mask.height() != self.bbox.height() {
            return Err(StampError::invalid_input(format!(
                "mask {}x{} does not match bounding box {}x{}",
                mask.width(),
                mask.height(),
                self.bbox.width(),
                self.bbox.height()
            )));
        }
        self.mask = Some(mask);
        Ok(self)
    }
}
