//! ONNX Runtime inference wrapper.
//!
//! [`OrtInfer`] owns a small pool of sessions for one model file. Sessions are
//! created once, when a strategy is built, and live exactly as long as the
//! wrapper; dropping it releases the sessions and any device memory they hold.

mod ort_infer_config;

use crate::core::config::OrtSessionConfig;
use crate::core::errors::{SimpleError, StampError, StampResult};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::sync::atomic::{AtomicUsize, Ordering};

/// An owned copy of one f32 output tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTensor {
    /// Tensor shape as reported by ONNX Runtime.
    pub shape: Vec<i64>,
    /// Row-major tensor data.
    pub data: Vec<f32>,
}

impl RawTensor {
    /// Returns the shape as `usize` dimensions, rejecting dynamic (negative) axes.
    pub fn dims(&self) -> Option<Vec<usize>> {
        self.shape
            .iter()
            .map(|&d| usize::try_from(d).ok())
            .collect()
    }
}

/// Picks the first idle slot starting at `start`, waiting on `start` only
/// when every slot is busy. Poisoned slots are skipped.
fn acquire<T>(pool: &[Mutex<T>], start: usize) -> Option<(usize, MutexGuard<'_, T>)> {
    for offset in 0..pool.len() {
        let idx = (start + offset) % pool.len();
        match pool[idx].try_lock() {
            Ok(guard) => return Some((idx, guard)),
            Err(TryLockError::WouldBlock) | Err(TryLockError::Poisoned(_)) => continue,
        }
    }
    let idx = start % pool.len();
    pool[idx].lock().ok().map(|guard| (idx, guard))
}

/// A pool of ONNX Runtime sessions for a single model.
///
/// A run holds its session until the forward pass returns, even when the
/// caller stopped waiting for it (see the engine's strategy timeout). Other
/// runs pick an idle session, so with a pool of two or more a timed-out run
/// does not stall the next page; with a single session the next run waits.
#[derive(Debug)]
pub struct OrtInfer {
    sessions: Vec<Mutex<Session>>,
    next_idx: AtomicUsize,
    input_name: String,
    output_names: Vec<String>,
    model_path: PathBuf,
    model_name: String,
}

impl OrtInfer {
    /// Loads the model at `model_path`, applying the optional session settings.
    ///
    /// A missing file or a model ONNX Runtime cannot load is reported as
    /// [`StampError::ModelLoad`].
    pub fn new(
        model_path: impl AsRef<Path>,
        config: Option<&OrtSessionConfig>,
    ) -> StampResult<Self> {
        let path = model_path.as_ref();
        if !path.is_file() {
            return Err(StampError::model_load_error(
                path,
                "model file not found",
                Some("verify the checkpoint path and that the file has been downloaded"),
                None::<SimpleError>,
            ));
        }

        let pool_size = config.map(OrtSessionConfig::pool_size).unwrap_or(1);
        let mut sessions = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            sessions.push(Mutex::new(Self::create_session(path, config)?));
        }

        let (input_name, output_names) = {
            let first = sessions[0].lock().map_err(|_| {
                StampError::config_error_detailed(
                    path.display().to_string(),
                    "session lock poisoned during initialization",
                )
            })?;
            let input_name = first
                .inputs
                .first()
                .map(|input| input.name.clone())
                .ok_or_else(|| {
                    StampError::model_load_error(
                        path,
                        "model declares no inputs",
                        None,
                        None::<SimpleError>,
                    )
                })?;
            let output_names: Vec<String> =
                first.outputs.iter().map(|output| output.name.clone()).collect();
            if output_names.is_empty() {
                return Err(StampError::model_load_error(
                    path,
                    "model declares no outputs",
                    None,
                    None::<SimpleError>,
                ));
            }
            (input_name, output_names)
        };

        let model_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown_model")
            .to_string();

        tracing::debug!(
            model = %model_name,
            pool_size,
            input = %input_name,
            outputs = ?output_names,
            "loaded ONNX model"
        );

        Ok(Self {
            sessions,
            next_idx: AtomicUsize::new(0),
            input_name,
            output_names,
            model_path: path.to_path_buf(),
            model_name,
        })
    }

    fn create_session(path: &Path, config: Option<&OrtSessionConfig>) -> StampResult<Session> {
        let builder = Session::builder()?;
        let builder = match config {
            Some(cfg) => Self::apply_ort_config(builder, cfg)?,
            None => builder,
        };
        builder.commit_from_file(path).map_err(|e| {
            StampError::model_load_error(
                path,
                "failed to create ONNX session",
                Some("check the model file and the execution provider configuration"),
                Some(e),
            )
        })
    }

    /// Returns the model path associated with this inference engine.
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Returns the model name associated with this inference engine.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Returns the output names in session order.
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    /// Runs the model on a single NCHW tensor and copies out every f32 output,
    /// in session order.
    pub fn run(&self, input: &Array4<f32>) -> StampResult<Vec<RawTensor>> {
        let input_tensor = TensorRef::from_array_view(input.view()).map_err(|e| {
            StampError::inference_error(
                &self.model_name,
                format!("failed to convert input tensor with shape {:?}", input.shape()),
                e,
            )
        })?;
        let inputs = ort::inputs![self.input_name.as_str() => input_tensor];

        let start = self.next_idx.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let (idx, mut session) = acquire(&self.sessions, start).ok_or_else(|| {
            StampError::inference_error(
                &self.model_name,
                format!("failed to acquire session {}/{}", start, self.sessions.len()),
                SimpleError::new("session lock poisoned"),
            )
        })?;
        tracing::trace!(model = %self.model_name, session = idx, "running session");

        let outputs = session.run(inputs).map_err(|e| {
            StampError::inference_error(
                &self.model_name,
                format!("forward pass failed for input shape {:?}", input.shape()),
                e,
            )
        })?;

        self.output_names
            .iter()
            .map(|name| {
                let (shape, data) = outputs[name.as_str()]
                    .try_extract_tensor::<f32>()
                    .map_err(|e| {
                        StampError::inference_error(
                            &self.model_name,
                            format!("failed to extract output '{name}' as f32"),
                            e,
                        )
                    })?;
                Ok(RawTensor {
                    shape: shape.to_vec(),
                    data: data.to_vec(),
                })
            })
            .collect()
    }
}
