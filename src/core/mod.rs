//! The core module of the segmentation pipeline.
//!
//! This module contains the fundamental components of the pipeline:
//! - Error handling
//! - Configuration management
//! - ONNX Runtime inference backend
//! - Tensor type aliases
//! - Traits defining the model and I/O seams
//!
//! It also re-exports the commonly used types for convenience.

pub mod config;
pub mod errors;
pub mod inference;
pub mod tensor;
pub mod traits;

pub use config::{BlendMode, IntensityRange, ModelConfig, SegmentationConfig};
pub use errors::{ProcessingStage, SegError, SimpleError};
pub use inference::OrtClassifier;
pub use tensor::{LabelTensor, Tensor3D, Tensor4D, Tensor5D};
pub use traits::{VolumeCodec, VoxelClassifier};
