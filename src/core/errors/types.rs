//! Core error types for stamp detection.
//!
//! This module defines the [`StampError`] enum shared by every strategy, the
//! engine and the I/O collaborators, together with the [`ProcessingStage`]
//! discriminator used to say where a processing failure happened.

use crate::domain::StrategyKind;
use thiserror::Error;

/// Enum representing the stages a page goes through during detection.
///
/// Used to give processing errors enough context to tell a failed crop apart
/// from a malformed model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Decoding raw model outputs into detections.
    PostProcessing,
    /// Cropping accepted candidates out of the page.
    Cropping,
    /// Strategy execution inside the engine.
    StrategyExecution,
    /// Page loading and crop persistence.
    PageIo,
    /// Generic processing error.
    Generic,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::PostProcessing => write!(f, "post-processing"),
            ProcessingStage::Cropping => write!(f, "cropping"),
            ProcessingStage::StrategyExecution => write!(f, "strategy execution"),
            ProcessingStage::PageIo => write!(f, "page i/o"),
            ProcessingStage::Generic => write!(f, "processing"),
        }
    }
}

/// A single strategy failure isolated by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyFailure {
    /// The strategy that failed.
    pub strategy: StrategyKind,
    /// Rendered error message.
    pub message: String,
}

impl std::fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.strategy, self.message)
    }
}

/// Enum representing the errors that can occur while detecting stamps.
///
/// "No stamp found" is deliberately absent: an empty detection result is a
/// normal value, not an error.
#[derive(Error, Debug)]
pub enum StampError {
    /// Error occurred while decoding an image.
    #[error("image load")]
    ImageLoad(#[source] image::ImageError),

    /// Error occurred during processing.
    #[error("{kind} failed: {context}")]
    Processing {
        /// The stage of processing where the error occurred.
        kind: ProcessingStage,
        /// Additional context about the error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error occurred during model inference.
    #[error("inference failed in model '{model_name}': {context}")]
    Inference {
        /// The name of the model where inference failed.
        model_name: String,
        /// Additional context about the inference error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The page or another input is unusable (empty, zero-sized, malformed).
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// Error indicating a configuration problem.
    #[error("configuration: {message}")]
    ConfigError {
        /// A message describing the configuration error.
        message: String,
    },

    /// A model output did not have the expected shape.
    #[error(
        "unexpected output shape from model '{model_name}': expected {expected}, got {actual:?}"
    )]
    OutputShape {
        /// The model that produced the output.
        model_name: String,
        /// Human readable description of the expected layout.
        expected: String,
        /// The actual tensor shape.
        actual: Vec<i64>,
    },

    /// A strategy did not finish within the configured budget.
    #[error("strategy '{strategy}' timed out after {elapsed_ms} ms")]
    Timeout {
        /// The strategy that timed out.
        strategy: StrategyKind,
        /// The configured budget in milliseconds.
        elapsed_ms: u128,
    },

    /// Every requested strategy failed on the page.
    #[error("could not analyze page: all {} strategies failed ({})", .failures.len(), render_failures(.failures))]
    AllStrategiesFailed {
        /// Failures in invocation order.
        failures: Vec<StrategyFailure>,
    },

    /// Error from the ONNX Runtime session.
    #[error(transparent)]
    Session(#[from] ort::Error),

    /// Error from tensor reshaping.
    #[error("tensor operation")]
    Tensor(#[from] ndarray::ShapeError),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),

    /// Error loading a model file, with context and suggestions.
    #[error("model load failed for '{model_path}': {reason}{suggestion}")]
    ModelLoad {
        /// Path to the model that failed to load.
        model_path: String,
        /// Short reason string.
        reason: String,
        /// Optional suggestion (prefixed with '; ' when present).
        suggestion: String,
        /// Underlying source error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

fn render_failures(failures: &[StrategyFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<image::ImageError> for StampError {
    fn from(error: image::ImageError) -> Self {
        Self::ImageLoad(error)
    }
}

impl From<crate::core::config::ConfigError> for StampError {
    fn from(error: crate::core::config::ConfigError) -> Self {
        Self::ConfigError {
            message: error.to_string(),
        }
    }
}

impl StampError {
    /// Returns true when the error describes a misconfigured strategy
    /// (bad parameters or an unloadable model) rather than a bad page.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::ConfigError { .. } | Self::ModelLoad { .. })
    }

    /// Returns true when the error was caused by the page itself.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::InvalidInput { .. } | Self::ImageLoad(_))
    }
}

/// Convenient result alias used throughout the crate.
pub type StampResult<T> = Result<T, StampError>;
