//! Error types for the segmentation pipeline.
//!
//! This module defines the error taxonomy used throughout the crate:
//! configuration errors surfaced before any processing starts, geometry
//! errors for malformed input volumes, model invocation failures from the
//! ONNX backend, and consistency errors that signal programming defects
//! (for example a voxel left with zero accumulated blend weight). All of
//! them abort the current inference request; partial results are never
//! returned.

use thiserror::Error;

/// Enum representing different stages of processing in the segmentation pipeline.
///
/// This enum is used to identify which stage of the pipeline an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProcessingStage {
    /// Error occurred during intensity scaling.
    IntensityScaling,
    /// Error occurred during foreground cropping.
    ForegroundCrop,
    /// Error occurred during axis reorientation.
    Orientation,
    /// Error occurred during spacing resampling.
    Resampling,
    /// Error occurred during spatial padding.
    Padding,
    /// Error occurred during window blending.
    Blending,
    /// Error occurred while inverting transforms.
    Inversion,
    /// Generic processing error.
    Generic,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::IntensityScaling => write!(f, "intensity scaling"),
            ProcessingStage::ForegroundCrop => write!(f, "foreground crop"),
            ProcessingStage::Orientation => write!(f, "orientation"),
            ProcessingStage::Resampling => write!(f, "resampling"),
            ProcessingStage::Padding => write!(f, "padding"),
            ProcessingStage::Blending => write!(f, "blending"),
            ProcessingStage::Inversion => write!(f, "transform inversion"),
            ProcessingStage::Generic => write!(f, "processing"),
        }
    }
}

/// Enum representing the errors that can occur in the segmentation pipeline.
///
/// Variants map onto the failure taxonomy of the pipeline: `Config` and
/// `Geometry` reject bad requests up front, `ModelInvocation` wraps failures
/// of the opaque classifier, and `Consistency` marks violated internal
/// invariants that indicate a defect rather than a user input problem.
#[derive(Error, Debug)]
pub enum SegError {
    /// Error indicating a malformed or missing configuration value.
    #[error("configuration: {message}")]
    Config {
        /// A message describing the configuration error.
        message: String,
    },

    /// Error indicating the input volume's geometry is unusable.
    #[error("geometry: {message}")]
    Geometry {
        /// A message describing the geometry problem.
        message: String,
    },

    /// Error occurred during a processing stage.
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

    /// Error raised when the opaque model function fails for a window batch.
    #[error("model invocation: {context}")]
    ModelInvocation {
        /// Additional context about the failed invocation.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Internal invariant violation. This signals a programming defect,
    /// not a problem with the user's input.
    #[error("consistency violation: {message}")]
    Consistency {
        /// A message describing the violated invariant.
        message: String,
    },

    /// Error indicating invalid input data.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// Error from the ONNX Runtime session.
    #[error(transparent)]
    Session(#[from] ort::Error),

    /// Error from tensor shape operations.
    #[error("tensor operation")]
    Tensor(#[from] ndarray::ShapeError),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),
}

impl SegError {
    /// Creates a SegError for configuration problems.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a SegError for unusable volume geometry.
    pub fn geometry(message: impl Into<String>) -> Self {
        Self::Geometry {
            message: message.into(),
        }
    }

    /// Creates a SegError for a violated internal invariant.
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    /// Creates a SegError for invalid input data.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a SegError for a processing stage failure.
    ///
    /// # Arguments
    ///
    /// * `kind` - The stage of processing where the error occurred.
    /// * `context` - Additional context about the error.
    /// * `error` - The underlying error that caused this error.
    pub fn processing(
        kind: ProcessingStage,
        context: &str,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            kind,
            context: context.to_string(),
            source: Box::new(error),
        }
    }

    /// Creates a SegError for a failed model invocation.
    ///
    /// # Arguments
    ///
    /// * `context` - Additional context about the failed invocation.
    /// * `error` - The underlying error that caused this error.
    pub fn model_invocation(
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ModelInvocation {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a SegError for a model that failed to load.
    ///
    /// # Arguments
    ///
    /// * `path` - The path to the model file.
    /// * `detail` - A description of what went wrong.
    /// * `error` - The underlying error that caused this error.
    pub fn model_load(
        path: &std::path::Path,
        detail: &str,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ModelInvocation {
            context: format!("failed to load model '{}': {}", path.display(), detail),
            source: Box::new(error),
        }
    }
}

/// A simple error type that wraps a string message.
///
/// Used as an error source where no richer underlying error exists.
#[derive(Debug)]
pub struct SimpleError {
    message: String,
}

impl SimpleError {
    /// Creates a new SimpleError with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SimpleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SimpleError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SegError::config("overlap must be in [0, 1)");
        assert_eq!(err.to_string(), "configuration: overlap must be in [0, 1)");

        let err = SegError::consistency("voxel with zero accumulated weight");
        assert!(err.to_string().contains("consistency violation"));
    }

    #[test]
    fn test_processing_error_carries_stage() {
        let err = SegError::processing(
            ProcessingStage::Resampling,
            "output shape underflow",
            SimpleError::new("zero-sized axis"),
        );
        assert!(err.to_string().contains("resampling failed"));
    }
}
