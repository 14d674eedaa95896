//! # Stamp Crop
//!
//! Locates ink stamps (seals) on scanned document pages and crops them out.
//!
//! Three interchangeable strategies propose stamp regions:
//!
//! - **Color threshold**: HSV band mask, morphological clean-up and contour
//!   analysis. Needs no model.
//! - **Segmentation**: a class-agnostic mask generator (FastSAM over ONNX
//!   Runtime) whose masks are kept when their mean blue value is high enough.
//! - **Object detection**: a trained detector (YOLO-style or plain box-list
//!   ONNX output) filtered by class and confidence.
//!
//! A [`SelectionPolicy`](selection::SelectionPolicy) decides which of the
//! proposed candidates survive, the [`StampDetectionEngine`](engine::StampDetectionEngine)
//! composes it all for one page, and the [`BatchRunner`](batch::BatchRunner)
//! walks a directory of PDFs and images, writing one PNG per stamp.
//!
//! ## Modules
//!
//! * [`core`] - Errors, configuration validation, ONNX Runtime inference
//! * [`domain`] - Candidates, bounding boxes and detection results
//! * [`processors`] - Color conversion, morphology, contours, NMS, resizing
//! * [`strategies`] - The three detection strategies
//! * [`selection`] - Candidate ranking and the selection policy
//! * [`engine`] - Strategy composition for a single page
//! * [`io`] - Page loading and crop persistence
//! * [`batch`] - Directory-level processing
//! * [`utils`] - Cropping helpers and logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stamp_crop::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = StampDetectionEngine::builder()
//!     .min_area(2000)
//!     .selection(SelectionPolicy::SingleBest)
//!     .build()?;
//!
//! let page = image::open("scan.png")?.to_rgb8();
//! let result = engine.detect(&page)?;
//! for crop in result.crops() {
//!     println!("{} score={}", crop.candidate.bbox, crop.candidate.score);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Batch processing
//!
//! ```rust,no_run
//! use stamp_crop::prelude::*;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Arc::new(StampDetectionEngine::color_only()?);
//! let report = BatchRunner::new(engine)
//!     .with_output_dir("stamps")
//!     .run(Path::new("scans"))?;
//! println!("{} stamps on {} pages", report.stamp_count(), report.page_count());
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod core;
pub mod domain;
pub mod engine;
pub mod io;
pub mod processors;
pub mod selection;
pub mod strategies;
pub mod utils;

/// Prelude module for convenient imports.
///
/// ```rust
/// use stamp_crop::prelude::*;
/// ```
pub mod prelude {
    pub use crate::batch::{BatchReport, BatchRunner};
    pub use crate::core::{StampError, StampResult};
    pub use crate::domain::{
        BoundingBox, Candidate, DetectionResult, PageOutcome, StampCrop, StrategyKind,
    };
    pub use crate::engine::{EngineBuilder, EngineConfig, StampDetectionEngine};
    pub use crate::io::{CropWriter, DocumentPageSource, PageSource, load_pages};
    pub use crate::selection::SelectionPolicy;
    pub use crate::strategies::{
        ColorThresholdConfig, DetectionStrategy, FastSamConfig, OnnxObjectDetectorConfig,
    };
}
