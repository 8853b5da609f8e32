//! Resampling volumes to a fixed target voxel spacing.
//!
//! The forward pass interpolates trilinearly from the native spacing onto
//! the target grid. The original shape and spacing are recorded so the
//! inverse pass can map a label volume back onto the exact original voxel
//! grid; the inverse uses nearest-neighbor sampling since class labels are
//! categorical and must never be blended into fractional values.

use crate::core::errors::SegError;
use crate::core::tensor::{LabelTensor, Tensor4D};
use crate::domain::volume::Volume;
use ndarray::{Array3, Array4};

/// Recorded parameters of one resampling, consumed by the inverse pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampleRecord {
    /// Spatial shape before resampling.
    pub shape: [usize; 3],
    /// Voxel spacing before resampling.
    pub spacing: [f64; 3],
}

/// Resamples volumes onto a fixed target spacing.
#[derive(Debug, Clone)]
pub struct ResampleToSpacing {
    target: [f64; 3],
}

impl ResampleToSpacing {
    /// Creates a ResampleToSpacing for the given target spacing.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any component is not positive.
    pub fn new(target: [f64; 3]) -> Result<Self, SegError> {
        for (axis, s) in target.iter().enumerate() {
            if !s.is_finite() || *s <= 0.0 {
                return Err(SegError::config(format!(
                    "target spacing along axis {axis} must be positive, got {s}"
                )));
            }
        }
        Ok(Self { target })
    }

    /// Output shape for resampling `shape` at `spacing` onto the target grid.
    fn output_shape(&self, shape: [usize; 3], spacing: [f64; 3]) -> [usize; 3] {
        let mut out = [0usize; 3];
        for axis in 0..3 {
            let extent = shape[axis] as f64 * spacing[axis] / self.target[axis];
            out[axis] = (extent.round() as usize).max(1);
        }
        out
    }

    /// Resamples the volume trilinearly onto the target spacing.
    ///
    /// The affine's direction columns are rescaled by the spacing ratio so
    /// the volume keeps its physical extent.
    pub fn apply(&self, volume: Volume) -> Result<(Volume, ResampleRecord), SegError> {
        let shape = volume.spatial_shape();
        let spacing = volume.geometry.spacing;
        let record = ResampleRecord { shape, spacing };

        let out_shape = self.output_shape(shape, spacing);
        if out_shape == shape && spacing == self.target {
            return Ok((volume, record));
        }

        let data = resize_trilinear(&volume.data, out_shape);

        let mut geometry = volume.geometry;
        for axis in 0..3 {
            let ratio = self.target[axis] / spacing[axis];
            let mut col = geometry.affine.column(axis);
            for c in col.iter_mut() {
                *c *= ratio;
            }
            geometry.affine.set_column(axis, col);
            geometry.spacing[axis] = self.target[axis];
        }

        Ok((Volume { data, geometry }, record))
    }

    /// Maps a label volume back onto the exact pre-resample voxel grid
    /// using nearest-neighbor sampling.
    pub fn invert_labels(labels: LabelTensor, record: &ResampleRecord) -> LabelTensor {
        let (d, h, w) = labels.dim();
        if [d, h, w] == record.shape {
            return labels;
        }
        resize_nearest(&labels, record.shape)
    }
}

/// Maps an output index to a fractional source coordinate with pixel-center
/// alignment, clamped to the valid range.
fn source_coord(dst: usize, src_len: usize, dst_len: usize) -> f64 {
    let scale = src_len as f64 / dst_len as f64;
    let coord = (dst as f64 + 0.5) * scale - 0.5;
    coord.clamp(0.0, (src_len - 1) as f64)
}

/// Trilinear resize of a `[C, D, H, W]` volume to a new spatial shape.
pub fn resize_trilinear(data: &Tensor4D, out_shape: [usize; 3]) -> Tensor4D {
    let (channels, d, h, w) = data.dim();
    Array4::from_shape_fn(
        (channels, out_shape[0], out_shape[1], out_shape[2]),
        |(c, z, y, x)| {
            let sz = source_coord(z, d, out_shape[0]);
            let sy = source_coord(y, h, out_shape[1]);
            let sx = source_coord(x, w, out_shape[2]);

            let z0 = sz.floor() as usize;
            let y0 = sy.floor() as usize;
            let x0 = sx.floor() as usize;
            let z1 = (z0 + 1).min(d - 1);
            let y1 = (y0 + 1).min(h - 1);
            let x1 = (x0 + 1).min(w - 1);

            let fz = (sz - z0 as f64) as f32;
            let fy = (sy - y0 as f64) as f32;
            let fx = (sx - x0 as f64) as f32;

            let c000 = data[[c, z0, y0, x0]];
            let c001 = data[[c, z0, y0, x1]];
            let c010 = data[[c, z0, y1, x0]];
            let c011 = data[[c, z0, y1, x1]];
            let c100 = data[[c, z1, y0, x0]];
            let c101 = data[[c, z1, y0, x1]];
            let c110 = data[[c, z1, y1, x0]];
            let c111 = data[[c, z1, y1, x1]];

            let c00 = c000 * (1.0 - fx) + c001 * fx;
            let c01 = c010 * (1.0 - fx) + c011 * fx;
            let c10 = c100 * (1.0 - fx) + c101 * fx;
            let c11 = c110 * (1.0 - fx) + c111 * fx;

            let c0 = c00 * (1.0 - fy) + c01 * fy;
            let c1 = c10 * (1.0 - fy) + c11 * fy;

            c0 * (1.0 - fz) + c1 * fz
        },
    )
}

/// Nearest-neighbor resize of a `[D, H, W]` label map to a new shape.
pub fn resize_nearest(labels: &LabelTensor, out_shape: [usize; 3]) -> LabelTensor {
    let (d, h, w) = labels.dim();
    Array3::from_shape_fn((out_shape[0], out_shape[1], out_shape[2]), |(z, y, x)| {
        let sz = source_coord(z, d, out_shape[0]).round() as usize;
        let sy = source_coord(y, h, out_shape[1]).round() as usize;
        let sx = source_coord(x, w, out_shape[2]).round() as usize;
        labels[[sz.min(d - 1), sy.min(h - 1), sx.min(w - 1)]]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::Geometry;
    use ndarray::Array4;

    #[test]
    fn test_output_shape_follows_spacing_ratio() {
        let resample = ResampleToSpacing::new([1.5, 1.5, 2.0]).unwrap();
        // 30 voxels at 3.0mm cover 90mm -> 60 voxels at 1.5mm.
        assert_eq!(
            resample.output_shape([30, 30, 30], [3.0, 3.0, 4.0]),
            [60, 60, 60]
        );
        // Never collapses an axis to zero.
        assert_eq!(resample.output_shape([1, 1, 1], [0.1, 0.1, 0.1]), [1, 1, 1]);
    }

    #[test]
    fn test_constant_volume_stays_constant() {
        let data = Array4::from_elem((1, 10, 10, 10), 5.0f32);
        let volume = Volume::new(data, Geometry::ras([2.0, 2.0, 2.0]).unwrap()).unwrap();
        let resample = ResampleToSpacing::new([1.0, 1.0, 1.0]).unwrap();
        let (out, record) = resample.apply(volume).unwrap();
        assert_eq!(out.spatial_shape(), [20, 20, 20]);
        assert_eq!(record.shape, [10, 10, 10]);
        assert_eq!(record.spacing, [2.0, 2.0, 2.0]);
        assert!(out.data.iter().all(|&v| (v - 5.0).abs() < 1e-6));
        assert_eq!(out.geometry.spacing, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_identity_when_already_at_target() {
        let data = Array4::from_elem((1, 4, 4, 4), 1.0f32);
        let volume = Volume::new(data.clone(), Geometry::ras([1.5, 1.5, 2.0]).unwrap()).unwrap();
        let resample = ResampleToSpacing::new([1.5, 1.5, 2.0]).unwrap();
        let (out, _) = resample.apply(volume).unwrap();
        assert_eq!(out.data, data);
    }

    #[test]
    fn test_invert_restores_exact_shape() {
        let data = Array4::from_shape_fn((1, 7, 9, 11), |(_, z, _, _)| z as f32);
        let volume = Volume::new(data, Geometry::ras([2.0, 1.0, 1.0]).unwrap()).unwrap();
        let resample = ResampleToSpacing::new([1.0, 1.0, 1.0]).unwrap();
        let (out, record) = resample.apply(volume).unwrap();
        assert_eq!(out.spatial_shape(), [14, 9, 11]);

        let labels = out.data.index_axis(ndarray::Axis(0), 0).mapv(|v| v.round() as u32);
        let restored = ResampleToSpacing::invert_labels(labels, &record);
        assert_eq!(restored.dim(), (7, 9, 11));
    }

    #[test]
    fn test_nearest_preserves_label_values() {
        let labels = LabelTensor::from_shape_fn((4, 4, 4), |(z, _, _)| if z < 2 { 0 } else { 7 });
        let resized = resize_nearest(&labels, [8, 8, 8]);
        // Only existing class values appear, never interpolated ones.
        assert!(resized.iter().all(|&v| v == 0 || v == 7));
        assert_eq!(resized[[0, 0, 0]], 0);
        assert_eq!(resized[[7, 7, 7]], 7);
    }

    #[test]
    fn test_rejects_non_positive_spacing() {
        assert!(ResampleToSpacing::new([1.0, 0.0, 1.0]).is_err());
        assert!(ResampleToSpacing::new([1.0, -1.0, 1.0]).is_err());
    }
}
