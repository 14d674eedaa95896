//! ONNX Runtime session settings shared by the model-backed strategies.

use serde::{Deserialize, Serialize};

/// Graph optimization levels for ONNX Runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OrtGraphOptimizationLevel {
    /// Disable all optimizations.
    DisableAll,
    /// Enable basic optimizations.
    #[default]
    Level1,
    /// Enable extended optimizations.
    Level2,
    /// Enable all optimizations.
    Level3,
}

/// Execution providers a model session may run on. Configured per model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum OrtExecutionProvider {
    /// CPU execution provider.
    #[default]
    CPU,
    /// NVIDIA CUDA execution provider (requires the `cuda` feature).
    CUDA {
        /// CUDA device ID (default: 0).
        device_id: Option<i32>,
        /// Memory limit in bytes.
        gpu_mem_limit: Option<usize>,
    },
}

/// Configuration for ONNX Runtime sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrtSessionConfig {
    /// Number of threads used to parallelize execution within nodes.
    #[serde(default)]
    pub intra_threads: Option<usize>,
    /// Number of threads used to parallelize execution across nodes.
    #[serde(default)]
    pub inter_threads: Option<usize>,
    /// Graph optimization level.
    #[serde(default)]
    pub optimization_level: Option<OrtGraphOptimizationLevel>,
    /// Execution providers in order of preference.
    #[serde(default)]
    pub execution_providers: Option<Vec<OrtExecutionProvider>>,
    /// Number of sessions kept per model for concurrent pages.
    #[serde(default)]
    pub session_pool_size: Option<usize>,
}

impl OrtSessionConfig {
    /// Creates a new OrtSessionConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of intra-op threads.
    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = Some(threads);
        self
    }

    /// Sets the number of inter-op threads.
    pub fn with_inter_threads(mut self, threads: usize) -> Self {
        self.inter_threads = Some(threads);
        self
    }

    /// Sets the graph optimization level.
    pub fn with_optimization_level(mut self, level: OrtGraphOptimizationLevel) -> Self {
        self.optimization_level = Some(level);
        self
    }

    /// Adds a single execution provider.
    pub fn add_execution_provider(mut self, provider: OrtExecutionProvider) -> Self {
        self.execution_providers
            .get_or_insert_with(Vec::new)
            .push(provider);
        self
    }

    /// Sets how many sessions are created per model.
    pub fn with_session_pool_size(mut self, size: usize) -> Self {
        self.session_pool_size = Some(size);
        self
    }

    /// Gets the effective session pool size (at least one).
    pub fn pool_size(&self) -> usize {
        self.session_pool_size.unwrap_or(1).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ort_session_config_builder() {
        let config = OrtSessionConfig::new()
            .with_intra_threads(4)
            .with_inter_threads(2)
            .with_optimization_level(OrtGraphOptimizationLevel::Level2)
            .add_execution_provider(OrtExecutionProvider::CPU);

        assert_eq!(config.intra_threads, Some(4));
        assert_eq!(config.inter_threads, Some(2));
        assert_eq!(
            config.optimization_level,
            Some(OrtGraphOptimizationLevel::Level2)
        );
        assert_eq!(
            config.execution_providers,
            Some(vec![OrtExecutionProvider::CPU])
        );
    }

    #[test]
    fn test_pool_size_never_zero() {
        assert_eq!(OrtSessionConfig::new().pool_size(), 1);
        assert_eq!(OrtSessionConfig::new().with_session_pool_size(0).pool_size(), 1);
        assert_eq!(OrtSessionConfig::new().with_session_pool_size(3).pool_size(), 3);
    }

    #[test]
    fn test_deserialize_cuda_provider() {
        let json = r#"{"execution_providers":[{"CUDA":{"device_id":1,"gpu_mem_limit":null}}]}"#;
        let config: OrtSessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.execution_providers,
            Some(vec![OrtExecutionProvider::CUDA {
                device_id: Some(1),
                gpu_mem_limit: None
            }])
        );
    }
}
