//! The core module of the stamp detection engine.
//!
//! This module contains the fundamental building blocks shared by every
//! strategy:
//! - Configuration types and validation
//! - Error handling
//! - ONNX Runtime inference
//! - Page validation helpers

pub mod config;
pub mod errors;
pub mod inference;
pub mod validation;

pub use config::{ConfigError, ConfigValidator, OrtSessionConfig, ParallelPolicy};
pub use errors::{ProcessingStage, SimpleError, StampError, StampResult, StrategyFailure};
pub use inference::{OrtInfer, RawTensor};
pub use validation::validate_page;
