use super::OrtInfer;
use crate::core::config::{OrtExecutionProvider, OrtGraphOptimizationLevel, OrtSessionConfig};
use ort::execution_providers::ExecutionProviderDispatch;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};

impl From<OrtGraphOptimizationLevel> for GraphOptimizationLevel {
    fn from(level: OrtGraphOptimizationLevel) -> Self {
        match level {
            OrtGraphOptimizationLevel::DisableAll => GraphOptimizationLevel::Disable,
            OrtGraphOptimizationLevel::Level1 => GraphOptimizationLevel::Level1,
            OrtGraphOptimizationLevel::Level2 => GraphOptimizationLevel::Level2,
            OrtGraphOptimizationLevel::Level3 => GraphOptimizationLevel::Level3,
        }
    }
}

fn dispatch(provider: &OrtExecutionProvider) -> Result<ExecutionProviderDispatch, ort::Error> {
    match provider {
        OrtExecutionProvider::CPU => {
            Ok(ort::execution_providers::CPUExecutionProvider::default().build())
        }
        #[cfg(feature = "cuda")]
        OrtExecutionProvider::CUDA {
            device_id,
            gpu_mem_limit,
        } => {
            let mut cuda = ort::execution_providers::CUDAExecutionProvider::default();
            if let Some(id) = *device_id {
                cuda = cuda.with_device_id(id);
            }
            if let Some(limit) = *gpu_mem_limit {
                cuda = cuda.with_memory_limit(limit);
            }
            Ok(cuda.build())
        }
        #[cfg(not(feature = "cuda"))]
        OrtExecutionProvider::CUDA { .. } => Err(ort::Error::new(
            "CUDA execution provider requested but stamp-crop was built without the `cuda` feature",
        )),
    }
}

impl OrtInfer {
    /// Applies thread counts, optimization level and execution providers.
    pub(super) fn apply_ort_config(
        mut builder: SessionBuilder,
        cfg: &OrtSessionConfig,
    ) -> Result<SessionBuilder, ort::Error> {
        if let Some(threads) = cfg.intra_threads {
            builder = builder.with_intra_threads(threads)?;
        }
        if let Some(threads) = cfg.inter_threads {
            builder = builder.with_inter_threads(threads)?;
        }
        if let Some(level) = cfg.optimization_level {
            builder = builder.with_optimization_level(level.into())?;
        }
        let providers = cfg
            .execution_providers
            .iter()
            .flatten()
            .map(dispatch)
            .collect::<Result<Vec<_>, _>>()?;
        if !providers.is_empty() {
            builder = builder.with_execution_providers(providers)?;
        }
        Ok(builder)
    }
}
