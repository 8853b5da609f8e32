//! Weighted blending of overlapping window predictions.
//!
//! The accumulator holds a running weighted sum of class logits and a
//! running weight sum over the full volume. Each window's prediction block
//! is merged at its absolute offset using a spatial importance map; overlap
//! regions are resolved by the final elementwise division. Accumulation is
//! associative and commutative, so windows may be added in any order and
//! grouping, as long as each window is added exactly once.
//!
//! Blending always happens in logit space. Class selection (argmax) runs
//! only after finalize; discretizing per window first would produce seam
//! artifacts at window boundaries.

use crate::core::config::BlendMode;
use crate::core::errors::SegError;
use crate::core::tensor::{Tensor3D, Tensor4D};
use crate::inferer::tiling::GridWindow;
use ndarray::{Array3, ArrayView4, Axis, azip, s};

/// Minimum importance relative to the peak; keeps border weights positive
/// so the gaussian taper can never zero out a voxel's total weight.
const IMPORTANCE_FLOOR: f32 = 1e-3;

/// Builds the spatial importance map for one window.
///
/// `Constant` weights the whole window uniformly (plain averaging of
/// overlaps). `Gaussian` is a separable taper peaking at the window center
/// with `sigma = sigma_scale * extent` per axis, favoring window interiors
/// over window edges for smoother seams.
pub fn importance_map(mode: BlendMode, roi_size: [usize; 3], sigma_scale: f64) -> Tensor3D {
    match mode {
        BlendMode::Constant => Array3::from_elem((roi_size[0], roi_size[1], roi_size[2]), 1.0),
        BlendMode::Gaussian => {
            let axis_weights: Vec<Vec<f32>> = roi_size
                .iter()
                .map(|&n| gaussian_axis(n, sigma_scale))
                .collect();
            Array3::from_shape_fn((roi_size[0], roi_size[1], roi_size[2]), |(z, y, x)| {
                axis_weights[0][z] * axis_weights[1][y] * axis_weights[2][x]
            })
        }
    }
}

fn gaussian_axis(n: usize, sigma_scale: f64) -> Vec<f32> {
    let center = (n as f64 - 1.0) / 2.0;
    let sigma = (sigma_scale * n as f64).max(f64::EPSILON);
    (0..n)
        .map(|i| {
            let d = (i as f64 - center) / sigma;
            let w = (-0.5 * d * d).exp() as f32;
            w.max(IMPORTANCE_FLOOR)
        })
        .collect()
}

/// Accumulates weighted window predictions over the full volume.
///
/// Owned exclusively by one inference run and consumed by
/// [`BlendAccumulator::finalize`].
#[derive(Debug)]
pub struct BlendAccumulator {
    /// Running weighted sum of logits `[K, D, H, W]`.
    weighted_sum: Tensor4D,
    /// Running weight sum `[D, H, W]`.
    weight_sum: Tensor3D,
    /// Per-window importance map `[roi_d, roi_h, roi_w]`.
    importance: Tensor3D,
    num_classes: usize,
}

impl BlendAccumulator {
    /// Creates a zero-initialized accumulator for a volume of the given
    /// spatial shape.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `num_classes` is zero or the
    /// importance map is empty.
    pub fn new(
        shape: [usize; 3],
        num_classes: usize,
        importance: Tensor3D,
    ) -> Result<Self, SegError> {
        if num_classes == 0 {
            return Err(SegError::config("num_classes must be at least 1"));
        }
        if importance.is_empty() {
            return Err(SegError::config("importance map must be non-empty"));
        }
        Ok(Self {
            weighted_sum: Tensor4D::zeros((num_classes, shape[0], shape[1], shape[2])),
            weight_sum: Tensor3D::zeros((shape[0], shape[1], shape[2])),
            importance,
            num_classes,
        })
    }

    /// Merges one window's prediction block `[K, wd, wh, ww]` at the
    /// window's absolute offset. Block regions extending past the volume
    /// edge are clipped off before accumulation.
    ///
    /// # Errors
    ///
    /// Returns a consistency error if the block's class count or spatial
    /// shape disagrees with the accumulator and window.
    pub fn add(&mut self, window: &GridWindow, block: ArrayView4<f32>) -> Result<(), SegError> {
        let (k, bd, bh, bw) = block.dim();
        if k != self.num_classes {
            return Err(SegError::consistency(format!(
                "prediction block has {k} classes, accumulator expects {}",
                self.num_classes
            )));
        }
        if [bd, bh, bw] != window.size {
            return Err(SegError::consistency(format!(
                "prediction block shape [{bd}, {bh}, {bw}] does not match window size {:?}",
                window.size
            )));
        }
        if self.importance.dim() != (bd, bh, bw) {
            return Err(SegError::consistency(format!(
                "importance map shape {:?} does not match window size {:?}",
                self.importance.dim(),
                window.size
            )));
        }

        let (_, vd, vh, vw) = self.weighted_sum.dim();
        let volume_shape = [vd, vh, vw];
        let mut len = [0usize; 3];
        for axis in 0..3 {
            if window.origin[axis] >= volume_shape[axis] {
                return Err(SegError::consistency(format!(
                    "window origin {:?} lies outside volume shape {volume_shape:?}",
                    window.origin
                )));
            }
            len[axis] = window.size[axis].min(volume_shape[axis] - window.origin[axis]);
        }
        let [o0, o1, o2] = window.origin;
        let [l0, l1, l2] = len;

        let importance = self.importance.slice(s![..l0, ..l1, ..l2]);
        for class in 0..self.num_classes {
            let mut dst = self.weighted_sum.index_axis_mut(Axis(0), class);
            let mut dst = dst.slice_mut(s![o0..o0 + l0, o1..o1 + l1, o2..o2 + l2]);
            let src = block.slice(s![class, ..l0, ..l1, ..l2]);
            azip!((d in &mut dst, &b in &src, &w in &importance) *d += b * w);
        }
        let mut weights = self
            .weight_sum
            .slice_mut(s![o0..o0 + l0, o1..o1 + l1, o2..o2 + l2]);
        azip!((d in &mut weights, &w in &importance) *d += w);

        Ok(())
    }

    /// Divides the weighted sum by the weight sum, yielding the blended
    /// logits `[K, D, H, W]`.
    ///
    /// # Errors
    ///
    /// Returns a consistency error if any voxel has zero accumulated
    /// weight. Full coverage by the tiling plan guarantees this cannot
    /// happen; a zero here is a programming defect, not an input problem.
    pub fn finalize(self) -> Result<Tensor4D, SegError> {
        if let Some(idx) = self.weight_sum.iter().position(|&w| w <= 0.0) {
            return Err(SegError::consistency(format!(
                "voxel {idx} has zero accumulated weight; tiling plan left a gap"
            )));
        }
        let mut weighted_sum = self.weighted_sum;
        for mut class_plane in weighted_sum.axis_iter_mut(Axis(0)) {
            azip!((d in &mut class_plane, &w in &self.weight_sum) *d /= w);
        }
        Ok(weighted_sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn full_window(shape: [usize; 3]) -> GridWindow {
        GridWindow {
            origin: [0, 0, 0],
            size: shape,
        }
    }

    #[test]
    fn test_single_window_is_identity() {
        let shape = [4, 4, 4];
        let importance = importance_map(BlendMode::Constant, shape, 0.125);
        let mut acc = BlendAccumulator::new(shape, 2, importance).unwrap();

        let block = Array4::from_shape_fn((2, 4, 4, 4), |(k, z, y, x)| (k * 64 + z * 16 + y * 4 + x) as f32);
        acc.add(&full_window(shape), block.view()).unwrap();
        let result = acc.finalize().unwrap();
        assert_eq!(result, block);
    }

    #[test]
    fn test_overlapping_identity_windows_average_to_constant() {
        // 10^3 volume of constant 5, windows of 6 with overlap 0.5, and a
        // model that returns its input unchanged: the blend must finalize
        // to the constant volume.
        let plan = crate::inferer::tiling::TilingPlan::new([10, 10, 10], [6, 6, 6], 0.5).unwrap();
        assert_eq!(plan.len(), 27);
        let importance = importance_map(BlendMode::Constant, [6, 6, 6], 0.125);
        let mut acc = BlendAccumulator::new([10, 10, 10], 1, importance).unwrap();
        let block = Array4::from_elem((1, 6, 6, 6), 5.0f32);
        for window in plan.windows() {
            acc.add(window, block.view()).unwrap();
        }
        let result = acc.finalize().unwrap();
        assert!(result.iter().all(|&v| (v - 5.0).abs() < 1e-5));
    }

    #[test]
    fn test_gaussian_weights_peak_at_center() {
        let importance = importance_map(BlendMode::Gaussian, [7, 7, 7], 0.125);
        let center = importance[[3, 3, 3]];
        let corner = importance[[0, 0, 0]];
        assert!(center > corner);
        assert!(corner >= IMPORTANCE_FLOOR.powi(3));
        assert!((center - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_gaussian_blend_of_equal_windows_is_identity() {
        // Tapered weighting still averages identical contributions to the
        // contribution itself.
        let shape = [10, 10, 10];
        let plan = crate::inferer::tiling::TilingPlan::new(shape, [6, 6, 6], 0.5).unwrap();
        let importance = importance_map(BlendMode::Gaussian, [6, 6, 6], 0.125);
        let mut acc = BlendAccumulator::new(shape, 1, importance).unwrap();
        let block = Array4::from_elem((1, 6, 6, 6), 3.0f32);
        for window in plan.windows() {
            acc.add(window, block.view()).unwrap();
        }
        let result = acc.finalize().unwrap();
        assert!(result.iter().all(|&v| (v - 3.0).abs() < 1e-4));
    }

    #[test]
    fn test_uncovered_voxel_is_a_consistency_error() {
        let importance = importance_map(BlendMode::Constant, [2, 2, 2], 0.125);
        let mut acc = BlendAccumulator::new([4, 4, 4], 1, importance).unwrap();
        let window = GridWindow {
            origin: [0, 0, 0],
            size: [2, 2, 2],
        };
        let block = Array4::from_elem((1, 2, 2, 2), 1.0f32);
        acc.add(&window, block.view()).unwrap();
        match acc.finalize() {
            Err(SegError::Consistency { .. }) => {}
            other => panic!("expected consistency error, got {other:?}"),
        }
    }

    #[test]
    fn test_mismatched_block_is_rejected() {
        let importance = importance_map(BlendMode::Constant, [2, 2, 2], 0.125);
        let mut acc = BlendAccumulator::new([4, 4, 4], 2, importance).unwrap();
        let window = GridWindow {
            origin: [0, 0, 0],
            size: [2, 2, 2],
        };
        let wrong_classes = Array4::from_elem((1, 2, 2, 2), 1.0f32);
        assert!(acc.add(&window, wrong_classes.view()).is_err());
        let wrong_shape = Array4::from_elem((2, 3, 2, 2), 1.0f32);
        assert!(acc.add(&window, wrong_shape.view()).is_err());
    }
}
