//! The stamp detection engine.
//!
//! [`StampDetectionEngine`] runs an ordered list of strategies over a page,
//! applies the [`SelectionPolicy`] to everything they proposed, and crops the
//! accepted boxes out of the page. Strategies are built once, by
//! [`EngineBuilder`], and shared immutably afterwards; the engine is `Send +
//! Sync` and can serve many pages concurrently.
//!
//! # Failure isolation
//!
//! A strategy that fails on a page is recorded in
//! [`DetectionResult::failures`] and the others carry on. The page fails with
//! [`StampError::AllStrategiesFailed`] only when every strategy failed. A page
//! on which nothing is found yields an empty result, not an error.

use crate::core::config::ConfigValidator;
use crate::core::errors::{
    ProcessingStage, SimpleError, StampError, StampResult, StrategyFailure,
};
use crate::core::validation::validate_page;
use crate::domain::{Candidate, DetectionResult, StampCrop, StrategyKind};
use crate::selection::SelectionPolicy;
use crate::strategies::{
    ColorThresholdConfig, ColorThresholdStrategy, DetectionStrategy, FastSamConfig,
    FastSamMaskGenerator, MaskGenerator, ObjectDetectionConfig, ObjectDetectionStrategy,
    ObjectDetector, OnnxObjectDetector, OnnxObjectDetectorConfig, SegmentationConfig,
    SegmentationStrategy,
};
use crate::utils::BBoxCrop;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Serializable engine settings.
///
/// Every field has a default, so a JSON file only needs the values it
/// changes:
///
/// ```json
/// {
///   "strategies": ["color_threshold", "object_detection"],
///   "selection": { "policy": "all_above_threshold", "min_score": 0.5 },
///   "detector": { "model_path": "models/stamp_yolo.onnx" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Strategies to run, in invocation order.
    pub strategies: Vec<StrategyKind>,
    pub selection: SelectionPolicy,
    pub color: ColorThresholdConfig,
    pub segmentation: SegmentationConfig,
    /// Mask generator model for the segmentation strategy.
    pub fastsam: Option<FastSamConfig>,
    pub object_detection: ObjectDetectionConfig,
    /// Detector model for the object-detection strategy.
    pub detector: Option<OnnxObjectDetectorConfig>,
    /// Per-strategy time budget in milliseconds. A strategy past its budget
    /// is reported as failed while its run finishes in the background; a
    /// model strategy keeps its ONNX session until then, so give it a
    /// session pool of two or more to avoid stalling the next page.
    pub strategy_timeout_ms: Option<u64>,
    /// Build with the remaining strategies when one cannot be constructed.
    pub allow_fallback: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategies: vec![StrategyKind::ColorThreshold],
            selection: SelectionPolicy::default(),
            color: ColorThresholdConfig::default(),
            segmentation: SegmentationConfig::default(),
            fastsam: None,
            object_detection: ObjectDetectionConfig::default(),
            detector: None,
            strategy_timeout_ms: None,
            allow_fallback: false,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from JSON text.
    pub fn from_json_str(json: &str) -> StampResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            StampError::config_error_detailed("engine configuration", e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> StampResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text).map_err(|e| {
            StampError::config_error_detailed(path.display().to_string(), e.to_string())
        })
    }

    /// Checks every nested configuration.
    pub fn validate(&self) -> StampResult<()> {
        if self.strategies.is_empty() {
            return Err(StampError::config_error("at least one strategy is required"));
        }
        if let SelectionPolicy::AllAboveThreshold { min_score } = self.selection {
            if !min_score.is_finite() {
                return Err(StampError::config_error(format!(
                    "selection threshold must be finite, got {min_score}"
                )));
            }
        }
        if self.strategy_timeout_ms == Some(0) {
            return Err(StampError::config_error("strategy timeout must be positive"));
        }
        self.color.validate()?;
        self.segmentation.validate()?;
        self.object_detection.validate()?;
        Ok(())
    }
}

/// Builds a [`StampDetectionEngine`].
///
/// Model-backed strategies need either an adapter (a [`MaskGenerator`] or an
/// [`ObjectDetector`]) or a model configuration the builder can load.
#[derive(Debug, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    mask_generator: Option<Arc<dyn MaskGenerator>>,
    object_detector: Option<Arc<dyn ObjectDetector>>,
    custom: Vec<Arc<dyn DetectionStrategy>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a full configuration.
    pub fn from_config(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Strategies to run, in invocation order. Duplicates are ignored.
    pub fn strategies(mut self, kinds: impl IntoIterator<Item = StrategyKind>) -> Self {
        self.config.strategies = kinds.into_iter().collect();
        self
    }

    pub fn selection(mut self, policy: SelectionPolicy) -> Self {
        self.config.selection = policy;
        self
    }

    pub fn color_config(mut self, config: ColorThresholdConfig) -> Self {
        self.config.color = config;
        self
    }

    /// Shorthand for the color strategy's minimum box area.
    pub fn min_area(mut self, min_area: u64) -> Self {
        self.config.color.min_area = min_area;
        self
    }

    pub fn segmentation_config(mut self, config: SegmentationConfig) -> Self {
        self.config.segmentation = config;
        self
    }

    pub fn fastsam_model(mut self, config: FastSamConfig) -> Self {
        self.config.fastsam = Some(config);
        self
    }

    /// Uses an already built mask generator instead of loading a model.
    pub fn mask_generator(mut self, generator: Arc<dyn MaskGenerator>) -> Self {
        self.mask_generator = Some(generator);
        self
    }

    pub fn object_detection_config(mut self, config: ObjectDetectionConfig) -> Self {
        self.config.object_detection = config;
        self
    }

    pub fn detector_model(mut self, config: OnnxObjectDetectorConfig) -> Self {
        self.config.detector = Some(config);
        self
    }

    /// Uses an already built detector instead of loading a model.
    pub fn object_detector(mut self, detector: Arc<dyn ObjectDetector>) -> Self {
        self.object_detector = Some(detector);
        self
    }

    /// Registers a strategy implementation directly. It replaces the built-in
    /// strategy of the same kind.
    pub fn register(mut self, strategy: Arc<dyn DetectionStrategy>) -> Self {
        self.custom.push(strategy);
        self
    }

    /// Sets the per-strategy time budget; see
    /// [`EngineConfig::strategy_timeout_ms`].
    pub fn strategy_timeout(mut self, timeout: Duration) -> Self {
        self.config.strategy_timeout_ms = Some(timeout.as_millis().max(1) as u64);
        self
    }

    /// When enabled, strategies that cannot be built are logged and dropped
    /// instead of failing the whole build.
    pub fn allow_fallback(mut self, allow: bool) -> Self {
        self.config.allow_fallback = allow;
        self
    }

    fn build_strategy(&self, kind: StrategyKind) -> StampResult<Arc<dyn DetectionStrategy>> {
        if let Some(custom) = self.custom.iter().rev().find(|s| s.kind() == kind) {
            return Ok(Arc::clone(custom));
        }
        match kind {
            StrategyKind::ColorThreshold => Ok(Arc::new(ColorThresholdStrategy::new(
                self.config.color.clone(),
            )?)),
            StrategyKind::Segmentation => {
                let generator: Arc<dyn MaskGenerator> =
                    match (&self.mask_generator, &self.config.fastsam) {
                        (Some(generator), _) => Arc::clone(generator),
                        (None, Some(model)) => Arc::new(FastSamMaskGenerator::new(model.clone())?),
                        (None, None) => {
                            return Err(StampError::config_error(
                                "segmentation strategy requires a mask generator or a FastSAM model",
                            ));
                        }
                    };
                Ok(Arc::new(SegmentationStrategy::new(
                    self.config.segmentation.clone(),
                    generator,
                )?))
            }
            StrategyKind::ObjectDetection => {
                let detector: Arc<dyn ObjectDetector> =
                    match (&self.object_detector, &self.config.detector) {
                        (Some(detector), _) => Arc::clone(detector),
                        (None, Some(model)) => Arc::new(OnnxObjectDetector::new(model.clone())?),
                        (None, None) => {
                            return Err(StampError::config_error(
                                "object detection strategy requires a detector or a detector model",
                            ));
                        }
                    };
                Ok(Arc::new(ObjectDetectionStrategy::new(
                    self.config.object_detection.clone(),
                    detector,
                )?))
            }
        }
    }

    /// Builds every requested strategy once.
    ///
    /// Without fallback, the first strategy that cannot be built fails the
    /// build. With fallback, it is skipped and reported by
    /// [`StampDetectionEngine::skipped`]; the build still fails if no
    /// strategy remains.
    pub fn build(self) -> StampResult<StampDetectionEngine> {
        self.config.validate()?;

        let mut order = Vec::new();
        let mut registry: HashMap<StrategyKind, Arc<dyn DetectionStrategy>> = HashMap::new();
        let mut skipped = Vec::new();

        for &kind in &self.config.strategies {
            let seen = registry.contains_key(&kind)
                || skipped.iter().any(|f: &StrategyFailure| f.strategy == kind);
            if seen {
                continue;
            }
            match self.build_strategy(kind) {
                Ok(strategy) => {
                    registry.insert(kind, strategy);
                    order.push(kind);
                }
                Err(err) if self.config.allow_fallback => {
                    tracing::warn!(
                        strategy = %kind,
                        error = %err,
                        "strategy unavailable, continuing without it"
                    );
                    skipped.push(StrategyFailure {
                        strategy: kind,
                        message: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        if order.is_empty() {
            return Err(StampError::config_error(format!(
                "no detection strategy could be built ({} skipped)",
                skipped.len()
            )));
        }

        tracing::debug!(strategies = ?order, selection = ?self.config.selection, "engine ready");
        Ok(StampDetectionEngine {
            registry,
            order,
            selection: self.config.selection,
            strategy_timeout: self.config.strategy_timeout_ms.map(Duration::from_millis),
            skipped,
        })
    }
}

/// Runs detection strategies over pages and crops the accepted stamps.
#[derive(Debug)]
pub struct StampDetectionEngine {
    registry: HashMap<StrategyKind, Arc<dyn DetectionStrategy>>,
    order: Vec<StrategyKind>,
    selection: SelectionPolicy,
    strategy_timeout: Option<Duration>,
    skipped: Vec<StrategyFailure>,
}

impl StampDetectionEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// An engine running only the color strategy with default settings.
    pub fn color_only() -> StampResult<Self> {
        EngineBuilder::new().build()
    }

    /// Strategies in invocation order.
    pub fn strategies(&self) -> &[StrategyKind] {
        &self.order
    }

    /// Strategies dropped at build time because they could not be built.
    pub fn skipped(&self) -> &[StrategyFailure] {
        &self.skipped
    }

    pub fn selection(&self) -> SelectionPolicy {
        self.selection
    }

    /// Detects stamps on one page.
    pub fn detect(&self, page: &RgbImage) -> StampResult<DetectionResult> {
        self.detect_with_policy(page, self.selection)
    }

    /// Detects stamps on one page with a different selection policy.
    pub fn detect_with_policy(
        &self,
        page: &RgbImage,
        policy: SelectionPolicy,
    ) -> StampResult<DetectionResult> {
        validate_page(page)?;

        // The worker threads of a timed run need an owned page.
        let shared_page = self.strategy_timeout.map(|_| Arc::new(page.clone()));

        let mut raw: Vec<Candidate> = Vec::new();
        let mut failures = Vec::new();
        for kind in &self.order {
            let Some(strategy) = self.registry.get(kind) else {
                continue;
            };
            let started = Instant::now();
            let outcome = match (self.strategy_timeout, &shared_page) {
                (Some(budget), Some(page)) => run_with_timeout(strategy, page, budget),
                _ => strategy.detect(page),
            };
            match outcome {
                Ok(candidates) => {
                    tracing::debug!(
                        strategy = %kind,
                        candidates = candidates.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "strategy finished"
                    );
                    raw.extend(candidates);
                }
                Err(err) => {
                    tracing::warn!(strategy = %kind, error = %err, "strategy failed on page");
                    failures.push(StrategyFailure {
                        strategy: *kind,
                        message: err.to_string(),
                    });
                }
            }
        }

        if failures.len() == self.order.len() {
            return Err(StampError::AllStrategiesFailed { failures });
        }

        let raw_count = raw.len();
        let accepted = policy.apply(raw);
        let crops = accepted
            .into_iter()
            .map(|candidate| crop_candidate(page, candidate))
            .collect::<StampResult<Vec<_>>>()?;

        tracing::debug!(raw = raw_count, accepted = crops.len(), "page analyzed");
        Ok(DetectionResult::new(crops, failures, raw_count))
    }
}

fn crop_candidate(page: &RgbImage, mut candidate: Candidate) -> StampResult<StampCrop> {
    let outcome = BBoxCrop::crop_bounding_box(page, &candidate.bbox).map_err(|e| {
        StampError::processing_error(
            ProcessingStage::Cropping,
            format!("cannot crop candidate {}", candidate.bbox),
            e,
        )
    })?;
    if outcome.clamped {
        // The mask no longer matches the clamped box.
        candidate.mask = None;
    }
    candidate.bbox = outcome.bbox;
    Ok(StampCrop {
        candidate,
        image: outcome.image,
        clamped: outcome.clamped,
    })
}

/// Runs `strategy` on a worker thread and stops waiting after `budget`.
///
/// The worker is detached on timeout and keeps any resource the strategy
/// holds, such as a model session, until `detect` returns.
fn run_with_timeout(
    strategy: &Arc<dyn DetectionStrategy>,
    page: &Arc<RgbImage>,
    budget: Duration,
) -> StampResult<Vec<Candidate>> {
    let kind = strategy.kind();
    let (tx, rx) = mpsc::channel();
    let worker = Arc::clone(strategy);
    let page = Arc::clone(page);
    thread::Builder::new()
        .name(format!("stamp-{kind}"))
        .spawn(move || {
            // The receiver is gone once the budget expired; nothing to report then.
            let _ = tx.send(worker.detect(&page));
        })?;

    match rx.recv_timeout(budget) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(StampError::Timeout {
            strategy: kind,
            elapsed_ms: budget.as_millis(),
        }),
        Err(RecvTimeoutError::Disconnected) => Err(StampError::processing_error(
            ProcessingStage::StrategyExecution,
            format!("strategy '{kind}' stopped without a result"),
            SimpleError::new("worker thread panicked"),
        )),
    }
}
