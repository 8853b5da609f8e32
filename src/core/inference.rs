//! ONNX Runtime backend for the voxel classifier.
//!
//! This module wraps an ONNX Runtime session pool behind the
//! [`VoxelClassifier`] trait. The session pool allows concurrent
//! predictions with round-robin selection; the input tensor name can be
//! auto-detected from the model when not configured.

use crate::core::config::ModelConfig;
use crate::core::errors::{SegError, SimpleError};
use crate::core::tensor::Tensor5D;
use crate::core::traits::VoxelClassifier;
use ort::{
    session::{Session, builder::SessionBuilder},
    value::TensorRef,
};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Input tensor names probed when none is configured.
const COMMON_INPUT_NAMES: [&str; 5] = ["x", "input", "images", "data", "image"];

/// A voxel classifier backed by ONNX Runtime.
///
/// Holds a pool of sessions for concurrent predictions. Each call selects a
/// session round-robin, converts the window batch `[N, C, D, H, W]` to an
/// ONNX tensor, runs the forward pass, and validates that the output is a
/// 5-D logit tensor with the configured class count and unchanged spatial
/// shape.
pub struct OrtClassifier {
    /// Pool of ONNX Runtime sessions for concurrent predictions.
    sessions: Vec<Mutex<Session>>,
    /// Next index for round-robin session selection.
    next_idx: AtomicUsize,
    /// The name of the input tensor.
    input_name: String,
    /// The name of the output tensor (the session's first output when None).
    output_name: Option<String>,
    /// The model path for error context.
    model_path: PathBuf,
    /// The number of output classes K.
    num_classes: usize,
}

impl std::fmt::Debug for OrtClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtClassifier")
            .field("model_path", &self.model_path)
            .field("input_name", &self.input_name)
            .field("num_classes", &self.num_classes)
            .field("pool_size", &self.sessions.len())
            .finish()
    }
}

impl OrtClassifier {
    /// Creates a classifier from a model configuration, building the
    /// session pool and resolving the input tensor name.
    ///
    /// # Errors
    ///
    /// Returns a model invocation error if any session fails to build.
    pub fn from_config(config: &ModelConfig) -> Result<Self, SegError> {
        let path = config.path.as_path();
        let pool_size = config.session_pool_size.unwrap_or(1).max(1);

        let mut sessions = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            sessions.push(Mutex::new(Self::build_session(path)?));
        }

        let input_name = match &config.input_name {
            Some(name) => name.clone(),
            None => Self::detect_input_name(&sessions[0])?,
        };

        tracing::debug!(
            model = %path.display(),
            input = %input_name,
            pool = pool_size,
            "ONNX classifier ready"
        );

        Ok(Self {
            sessions,
            next_idx: AtomicUsize::new(0),
            input_name,
            output_name: config.output_name.clone(),
            model_path: path.to_path_buf(),
            num_classes: config.num_classes,
        })
    }

    fn build_session(path: &Path) -> Result<Session, SegError> {
        Session::builder()
            .and_then(Self::apply_execution_providers)
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| {
                SegError::model_load(
                    path,
                    "failed to create ONNX session; verify model path and execution providers",
                    e,
                )
            })
    }

    #[allow(unused_mut)]
    fn apply_execution_providers(mut builder: SessionBuilder) -> Result<SessionBuilder, ort::Error> {
        #[cfg(feature = "cuda")]
        {
            use ort::execution_providers::CUDAExecutionProvider;
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])?;
        }
        #[cfg(feature = "tensorrt")]
        {
            use ort::execution_providers::TensorRTExecutionProvider;
            builder = builder
                .with_execution_providers([TensorRTExecutionProvider::default().build()])?;
        }
        #[cfg(feature = "directml")]
        {
            use ort::execution_providers::DirectMLExecutionProvider;
            builder = builder
                .with_execution_providers([DirectMLExecutionProvider::default().build()])?;
        }
        #[cfg(feature = "coreml")]
        {
            use ort::execution_providers::CoreMLExecutionProvider;
            builder = builder
                .with_execution_providers([CoreMLExecutionProvider::default().build()])?;
        }
        Ok(builder)
    }

    fn detect_input_name(session: &Mutex<Session>) -> Result<String, SegError> {
        let guard = session
            .lock()
            .map_err(|_| SegError::consistency("ONNX session lock poisoned"))?;
        let available: Vec<String> = guard.inputs.iter().map(|input| input.name.clone()).collect();
        Ok(COMMON_INPUT_NAMES
            .iter()
            .find(|&name| available.iter().any(|input| input == *name))
            .map(|s| s.to_string())
            .or_else(|| available.first().cloned())
            .unwrap_or_else(|| "x".to_string()))
    }

    fn get_output_name(&self) -> Result<String, SegError> {
        if let Some(name) = &self.output_name {
            return Ok(name.clone());
        }
        let guard = self.sessions[0]
            .lock()
            .map_err(|_| SegError::consistency("ONNX session lock poisoned"))?;
        guard
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| {
                SegError::model_invocation(
                    format!("model '{}' declares no outputs", self.model_path.display()),
                    SimpleError::new("empty output list"),
                )
            })
    }

    /// Runs the forward pass on a window batch and returns the logits.
    fn run_batch(&self, x: &Tensor5D) -> Result<Tensor5D, SegError> {
        let input_shape = x.shape().to_vec();
        let output_name = self.get_output_name()?;

        let input_tensor = TensorRef::from_array_view(x.view()).map_err(|e| {
            SegError::model_invocation(
                format!("failed to convert input tensor with shape {input_shape:?}"),
                e,
            )
        })?;
        let inputs = ort::inputs![self.input_name.as_str() => input_tensor];

        // Round-robin select a session
        let idx = self.next_idx.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session_guard = self.sessions[idx]
            .lock()
            .map_err(|_| SegError::consistency("ONNX session lock poisoned"))?;

        let outputs = session_guard.run(inputs).map_err(|e| {
            SegError::model_invocation(
                format!(
                    "forward pass failed for model '{}' with input '{}' (shape {:?})",
                    self.model_path.display(),
                    self.input_name,
                    input_shape
                ),
                e,
            )
        })?;

        let (output_shape, output_data) = outputs[output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                SegError::model_invocation(
                    format!("failed to extract output tensor '{output_name}' as f32"),
                    e,
                )
            })?;

        if output_shape.len() != 5 {
            return Err(SegError::model_invocation(
                format!(
                    "expected 5D logit tensor, got {}D with shape {:?}",
                    output_shape.len(),
                    output_shape
                ),
                SimpleError::new("invalid output tensor rank"),
            ));
        }

        let dims = (
            output_shape[0] as usize,
            output_shape[1] as usize,
            output_shape[2] as usize,
            output_shape[3] as usize,
            output_shape[4] as usize,
        );
        let array_view = ndarray::ArrayView5::from_shape(dims, output_data)
            .map_err(SegError::Tensor)?;
        Ok(array_view.to_owned())
    }
}

impl VoxelClassifier for OrtClassifier {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn predict_batch(&self, batch: &Tensor5D) -> Result<Tensor5D, SegError> {
        self.run_batch(batch)
    }
}
