//! Per-page detection results.

use super::candidate::{BoundingBox, Candidate, StrategyKind};
use crate::core::errors::StrategyFailure;
use image::RgbImage;
use serde::Serialize;

/// One accepted candidate and the pixels it covers.
#[derive(Debug, Clone)]
pub struct StampCrop {
    /// The accepted candidate, with its box clamped to the page.
    pub candidate: Candidate,
    /// The cropped sub-image.
    pub image: RgbImage,
    /// Whether the proposed box had to be clamped to the page.
    pub clamped: bool,
}

/// What happened to a page, for consumers that must tell
/// "no stamp found" apart from "could not analyze this page".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageOutcome {
    /// At least one stamp was accepted.
    Found,
    /// The page was analyzed and no candidate was accepted.
    NoStamp,
    /// The page could not be analyzed.
    Failed,
}

/// The engine's output for one page.
#[derive(Debug, Clone, Default)]
pub struct DetectionResult {
    crops: Vec<StampCrop>,
    failures: Vec<StrategyFailure>,
    raw_candidates: usize,
}

impl DetectionResult {
    pub(crate) fn new(
        crops: Vec<StampCrop>,
        failures: Vec<StrategyFailure>,
        raw_candidates: usize,
    ) -> Self {
        Self {
            crops,
            failures,
            raw_candidates,
        }
    }

    /// Accepted crops, in selection order.
    pub fn crops(&self) -> &[StampCrop] {
        &self.crops
    }

    /// Consumes the result and returns the crops.
    pub fn into_crops(self) -> Vec<StampCrop> {
        self.crops
    }

    /// Accepted candidates, in selection order.
    pub fn candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.crops.iter().map(|crop| &crop.candidate)
    }

    /// Bounding boxes of the accepted candidates.
    pub fn bounding_boxes(&self) -> Vec<BoundingBox> {
        self.candidates().map(|c| c.bbox).collect()
    }

    /// Strategies that failed while the others still produced this result.
    pub fn failures(&self) -> &[StrategyFailure] {
        &self.failures
    }

    /// Number of raw candidates proposed before selection.
    pub fn raw_candidate_count(&self) -> usize {
        self.raw_candidates
    }

    /// Number of accepted candidates.
    pub fn len(&self) -> usize {
        self.crops.len()
    }

    /// True when no stamp was accepted on the page.
    pub fn is_empty(&self) -> bool {
        self.crops.is_empty()
    }

    /// Whether any crop was clamped to the page extent.
    pub fn any_clamped(&self) -> bool {
        self.crops.iter().any(|crop| crop.clamped)
    }

    /// Found or NoStamp; a page that fails never produces a result.
    pub fn outcome(&self) -> PageOutcome {
        if self.is_empty() {
            PageOutcome::NoStamp
        } else {
            PageOutcome::Found
        }
    }

    /// Serializable summary of the accepted candidates.
    pub fn summary(&self) -> Vec<CandidateSummary> {
        self.crops
            .iter()
            .map(|crop| CandidateSummary {
                bbox: crop.candidate.bbox.to_tuple(),
                score: crop.candidate.score,
                source: crop.candidate.source,
                has_mask: crop.candidate.mask.is_some(),
                clamped: crop.clamped,
            })
            .collect()
    }
}

/// Flat, serializable view of an accepted candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateSummary {
    /// `(x_min, y_min, x_max, y_max)`.
    pub bbox: (u32, u32, u32, u32),
    /// Candidate score.
    pub score: f32,
    /// Producing strategy.
    pub source: StrategyKind,
    /// Whether a segmentation mask is attached.
    pub has_mask: bool,
    /// Whether the box was clamped to the page.
    pub clamped: bool,
}
