//! Small tensor helpers shared across the pipeline.

use crate::core::tensor::{LabelTensor, Tensor4D};
use ndarray::Array3;

/// Collapses blended class logits `[K, D, H, W]` into a per-voxel label map
/// by taking the class of maximum value at every voxel. Ties resolve to the
/// lowest class index.
pub fn argmax_channels(logits: &Tensor4D) -> LabelTensor {
    let (k, d, h, w) = logits.dim();
    Array3::from_shape_fn((d, h, w), |(z, y, x)| {
        let mut best = 0usize;
        let mut best_value = logits[[0, z, y, x]];
        for class in 1..k {
            let value = logits[[class, z, y, x]];
            if value > best_value {
                best = class;
                best_value = value;
            }
        }
        best as u32
    })
}
