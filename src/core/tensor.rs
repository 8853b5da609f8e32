//! Tensor type aliases used throughout the pipeline.
//!
//! Volumes are dense `ndarray` arrays: a single volume is `[C, D, H, W]`
//! (channels, depth, height, width), a window batch handed to the model is
//! `[N, C, D, H, W]`, and a discrete label map is `[D, H, W]` of class
//! indices.

/// A 3D tensor of f32 values, e.g. a spatial weight map `[D, H, W]`.
pub type Tensor3D = ndarray::Array3<f32>;

/// A 4D tensor of f32 values, e.g. a volume `[C, D, H, W]` or class
/// logits `[K, D, H, W]`.
pub type Tensor4D = ndarray::Array4<f32>;

/// A 5D tensor of f32 values: a batch of windows `[N, C, D, H, W]`.
pub type Tensor5D = ndarray::Array5<f32>;

/// A dense per-voxel class label map `[D, H, W]`.
pub type LabelTensor = ndarray::Array3<u32>;
