//! Color-threshold strategy: HSV band, morphology, external contours.

use super::DetectionStrategy;
use crate::core::config::ConfigValidator;
use crate::core::errors::{StampError, StampResult};
use crate::core::validation::validate_page;
use crate::domain::{Candidate, StrategyKind};
use crate::impl_config_validator;
use crate::processors::{
    HsvRange, close, external_contour_regions, hsv_range_mask, kernel_radius, open,
};
use crate::selection::rank_candidates;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Parameters of the color-threshold strategy.
///
/// Hue uses the 8-bit `[0, 180)` scale; all channel bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorThresholdConfig {
    pub hue_range: (u8, u8),
    pub saturation_range: (u8, u8),
    pub value_range: (u8, u8),
    /// Side of the square structuring element; must be odd.
    pub kernel_size: u32,
    pub close_iterations: u32,
    pub open_iterations: u32,
    /// Minimum bounding-box area in pixels; boxes with exactly this area are kept.
    pub min_area: u64,
}

impl Default for ColorThresholdConfig {
    fn default() -> Self {
        Self {
            hue_range: (90, 140),
            saturation_range: (50, 255),
            value_range: (50, 255),
            kernel_size: 5,
            close_iterations: 2,
            open_iterations: 1,
            min_area: 2000,
        }
    }
}

impl ColorThresholdConfig {
    /// The HSV band as a range matcher.
    pub fn hsv_range(&self) -> HsvRange {
        HsvRange {
            hue: self.hue_range,
            saturation: self.saturation_range,
            value: self.value_range,
        }
    }

    pub fn with_min_area(mut self, min_area: u64) -> Self {
        self.min_area = min_area;
        self
    }
}

impl_config_validator!(ColorThresholdConfig {
    hue_range: ordered_pair,
    saturation_range: ordered_pair,
    value_range: ordered_pair,
    kernel_size: range(1, 255),
});

/// Finds stamps by their ink color.
#[derive(Debug, Clone)]
pub struct ColorThresholdStrategy {
    config: ColorThresholdConfig,
    radius: u8,
}

impl ColorThresholdStrategy {
    /// Validates the configuration and builds the strategy.
    pub fn new(config: ColorThresholdConfig) -> StampResult<Self> {
        config.validate()?;
        let radius = kernel_radius(config.kernel_size)?;
        Ok(Self { config, radius })
    }

    pub fn config(&self) -> &ColorThresholdConfig {
        &self.config
    }
}

impl Default for ColorThresholdStrategy {
    fn default() -> Self {
        Self {
            config: ColorThresholdConfig::default(),
            radius: 2,
        }
    }
}

impl DetectionStrategy for ColorThresholdStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ColorThreshold
    }

    fn detect(&self, page: &RgbImage) -> StampResult<Vec<Candidate>> {
        validate_page(page)?;

        let mask = hsv_range_mask(page, &self.config.hsv_range());
        let mask = close(&mask, self.radius, self.config.close_iterations);
        let mask = open(&mask, self.radius, self.config.open_iterations);

        let regions = external_contour_regions(&mask);
        let total = regions.len();

        let candidates = regions
            .into_iter()
            .filter(|region| region.bbox.area() >= self.config.min_area)
            .map(|region| Candidate::new(region.bbox, region.area, StrategyKind::ColorThreshold))
            .collect::<Result<Vec<_>, StampError>>()?;

        tracing::debug!(
            contours = total,
            kept = candidates.len(),
            min_area = self.config.min_area,
            "color threshold detection finished"
        );

        Ok(rank_candidates(candidates))
    }
}
