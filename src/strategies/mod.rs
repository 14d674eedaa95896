//! Detection strategies.
//!
//! Every strategy turns one page image into a list of [`Candidate`]s. The
//! engine composes strategies through the [`DetectionStrategy`] trait and
//! never needs to know how a particular one works.

pub mod color_threshold;
pub mod object_detection;
pub mod segmentation;

pub use color_threshold::{ColorThresholdConfig, ColorThresholdStrategy};
pub use object_detection::{
    DetectorOutput, ObjectDetectionConfig, ObjectDetectionStrategy, ObjectDetector,
    OnnxObjectDetector, OnnxObjectDetectorConfig, OutputLayout, RawDetection,
};
pub use segmentation::{
    FastSamConfig, FastSamMaskGenerator, MaskGenerator, PageMask, SegmentationConfig,
    SegmentationStrategy,
};

use crate::core::errors::StampResult;
use crate::domain::{Candidate, StrategyKind};
use image::RgbImage;
use std::fmt::Debug;

/// A way of proposing stamp regions on a page.
///
/// Implementations must not mutate the page and must be deterministic for a
/// fixed page and configuration. An empty vector means "nothing found" and is
/// not an error.
pub trait DetectionStrategy: Send + Sync + Debug {
    /// Which strategy this is.
    fn kind(&self) -> StrategyKind;

    /// Name used in logs.
    fn name(&self) -> &str {
        self.kind().as_str()
    }

    /// Proposes candidates on `page`, ordered by descending score.
    fn detect(&self, page: &RgbImage) -> StampResult<Vec<Candidate>>;
}
