//! Configuration management for the detection engine.
//!
//! This module provides the validation trait shared by every strategy
//! configuration, ONNX Runtime session settings and the batch parallelism
//! policy.

pub mod derive;
pub mod errors;
pub mod onnx;
pub mod parallel;

pub use errors::{ConfigError, ConfigValidator};
pub use onnx::{OrtExecutionProvider, OrtGraphOptimizationLevel, OrtSessionConfig};
pub use parallel::ParallelPolicy;
