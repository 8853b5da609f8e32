//! Core traits for model invocation and volume I/O.
//!
//! The segmentation pipeline treats the model as an opaque voxel-block
//! classifier behind the [`VoxelClassifier`] trait, and file I/O as an
//! external collaborator behind the [`VolumeCodec`] trait. Both seams let
//! the test suite substitute deterministic stubs for the real ONNX session
//! and on-disk containers.

use crate::core::errors::SegError;
use crate::core::tensor::Tensor5D;
use crate::domain::volume::{LabelVolume, Volume};
use std::path::Path;

/// Trait for the opaque voxel-block classifier.
///
/// Implementations map a batch of fixed-size sub-volumes `[N, C, D, H, W]`
/// to per-class logits `[N, K, D, H, W]` with the same spatial shape. The
/// input shape and class count are static configuration, never derived from
/// a request. Classifiers are shared read-only across concurrent runs, so
/// implementations must be `Send + Sync`.
pub trait VoxelClassifier: Send + Sync {
    /// The number of output classes K this classifier produces.
    fn num_classes(&self) -> usize;

    /// Runs the classifier on a batch of windows.
    ///
    /// # Arguments
    ///
    /// * `batch` - Input tensor of shape `[N, C, D, H, W]`.
    ///
    /// # Returns
    ///
    /// A Result containing the class logits `[N, K, D, H, W]` or a SegError.
    /// The spatial shape of the output must equal the spatial shape of the
    /// input; violations surface as consistency errors in the caller.
    fn predict_batch(&self, batch: &Tensor5D) -> Result<Tensor5D, SegError>;
}

/// Trait for reading and writing volumes with their geometric metadata.
///
/// The on-disk container format is a collaborator concern; the only
/// contract is that voxel spacing, orientation, and offset round-trip
/// losslessly through `write` then `read`.
pub trait VolumeCodec {
    /// The error type of this codec.
    type Error;

    /// Reads a volume and its geometry from the given path.
    fn read(&self, path: &Path) -> Result<Volume, Self::Error>;

    /// Writes a volume and its geometry to the given path.
    fn write(&self, volume: &Volume, path: &Path) -> Result<(), Self::Error>;

    /// Writes a discrete label map and its geometry to the given path.
    fn write_labels(&self, labels: &LabelVolume, path: &Path) -> Result<(), Self::Error>;
}
