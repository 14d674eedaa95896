//! Error constructor helpers.
//!
//! Small ergonomic constructors so strategies and adapters can build
//! [`StampError`] values with consistent context strings.

use super::types::{ProcessingStage, StampError};
use std::path::Path;

/// A plain string error used when there is no richer source to chain.
#[derive(Debug)]
pub struct SimpleError {
    message: String,
}

impl SimpleError {
    /// Creates a new simple error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SimpleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SimpleError {}

impl StampError {
    /// Creates an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Creates a configuration error with enhanced context and details.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use stamp_crop::core::StampError;
    /// let err = StampError::config_error_detailed(
    ///     "engine",
    ///     "strategy 'segmentation' was requested but never registered",
    /// );
    /// assert!(err.is_configuration());
    /// ```
    pub fn config_error_detailed(context: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ConfigError {
            message: format!("{}: {}", context.into(), details.into()),
        }
    }

    /// Creates a processing error for the given stage.
    pub fn processing_error(
        kind: ProcessingStage,
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            kind,
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a post-processing error carrying only a message.
    pub fn postprocess_error(context: impl Into<String>) -> Self {
        let context = context.into();
        Self::Processing {
            kind: ProcessingStage::PostProcessing,
            source: Box::new(SimpleError::new(context.clone())),
            context,
        }
    }

    /// Creates an inference error for the named model.
    pub fn inference_error(
        model_name: impl Into<String>,
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Inference {
            model_name: model_name.into(),
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a model load error with an optional recovery suggestion.
    pub fn model_load_error(
        path: &Path,
        reason: impl Into<String>,
        suggestion: Option<&str>,
        source: Option<impl std::error::Error + Send + Sync + 'static>,
    ) -> Self {
        Self::ModelLoad {
            model_path: path.display().to_string(),
            reason: reason.into(),
            suggestion: suggestion
                .map(|s| format!("; suggestion: {s}"))
                .unwrap_or_default(),
            source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
        }
    }

    /// Creates an output shape error for the named model.
    pub fn output_shape(
        model_name: impl Into<String>,
        expected: impl Into<String>,
        actual: &[i64],
    ) -> Self {
        Self::OutputShape {
            model_name: model_name.into(),
            expected: expected.into(),
            actual: actual.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_load_error_formats_suggestion() {
        let err = StampError::model_load_error(
            Path::new("models/fastsam.onnx"),
            "file not found",
            Some("download the checkpoint first"),
            None::<std::io::Error>,
        );
        let message = err.to_string();
        assert!(message.contains("models/fastsam.onnx"));
        assert!(message.contains("; suggestion: download the checkpoint first"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_invalid_input_is_input_error() {
        let err = StampError::invalid_input("page has zero area");
        assert!(err.is_input());
        assert!(!err.is_configuration());
        assert_eq!(err.to_string(), "invalid input: page has zero area");
    }

    #[test]
    fn test_postprocess_error_stage() {
        let err = StampError::postprocess_error("mask prototype mismatch");
        assert!(matches!(
            err,
            StampError::Processing {
                kind: ProcessingStage::PostProcessing,
                ..
            }
        ));
    }

    #[test]
    fn test_processing_error_names_its_stage() {
        let err = StampError::processing_error(
            ProcessingStage::Cropping,
            "cannot crop candidate",
            SimpleError::new("box outside page"),
        );
        assert_eq!(err.to_string(), "cropping failed: cannot crop candidate");
        assert_eq!(ProcessingStage::PageIo.to_string(), "page i/o");
        assert_eq!(ProcessingStage::StrategyExecution.to_string(), "strategy execution");
    }
}
