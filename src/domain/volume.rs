//! Volume types: dense voxel data paired with its geometry.

use crate::core::errors::SegError;
use crate::core::tensor::{LabelTensor, Tensor4D};
use crate::domain::geometry::Geometry;

/// A dense volume `[C, D, H, W]` with its geometric metadata.
///
/// Invariant: the geometry always describes the current voxel grid. Every
/// operation that changes the spatial shape or spacing produces a new
/// `Volume` with an updated geometry.
#[derive(Debug, Clone)]
pub struct Volume {
    /// Voxel samples, channels first.
    pub data: Tensor4D,
    /// Spacing, orientation, and affine of the voxel grid.
    pub geometry: Geometry,
}

impl Volume {
    /// Creates a new Volume.
    ///
    /// # Errors
    ///
    /// Returns a geometry error if any spatial axis is empty; the pipeline
    /// requires three non-degenerate spatial dimensions.
    pub fn new(data: Tensor4D, geometry: Geometry) -> Result<Self, SegError> {
        let (c, d, h, w) = data.dim();
        if c == 0 || d == 0 || h == 0 || w == 0 {
            return Err(SegError::geometry(format!(
                "volume must have non-empty channel and spatial dimensions, got [{c}, {d}, {h}, {w}]"
            )));
        }
        Ok(Self { data, geometry })
    }

    /// The number of channels C.
    pub fn channels(&self) -> usize {
        self.data.dim().0
    }

    /// The spatial shape `[D, H, W]`.
    pub fn spatial_shape(&self) -> [usize; 3] {
        let (_, d, h, w) = self.data.dim();
        [d, h, w]
    }
}

/// A per-voxel class label map `[D, H, W]` with its geometric metadata.
#[derive(Debug, Clone)]
pub struct LabelVolume {
    /// Class index per voxel.
    pub data: LabelTensor,
    /// Spacing, orientation, and affine of the voxel grid.
    pub geometry: Geometry,
}

impl LabelVolume {
    /// The spatial shape `[D, H, W]`.
    pub fn spatial_shape(&self) -> [usize; 3] {
        let (d, h, w) = self.data.dim();
        [d, h, w]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn test_volume_rejects_empty_axes() {
        let geom = Geometry::ras([1.0, 1.0, 1.0]).unwrap();
        assert!(Volume::new(Array4::zeros((1, 0, 4, 4)), geom.clone()).is_err());
        assert!(Volume::new(Array4::zeros((0, 4, 4, 4)), geom.clone()).is_err());
        let vol = Volume::new(Array4::zeros((1, 2, 3, 4)), geom).unwrap();
        assert_eq!(vol.channels(), 1);
        assert_eq!(vol.spatial_shape(), [2, 3, 4]);
    }
}
