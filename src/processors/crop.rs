//! Foreground cropping to the bounding box of non-background voxels.
//!
//! Large scans are mostly empty air; cropping to the foreground bounding
//! box before resampling keeps the tiled inference small. The crop records
//! its origin and the pre-crop shape so the inverse pass can pad the label
//! map back into the original extent at the exact same position.

use crate::core::errors::SegError;
use crate::core::tensor::{LabelTensor, Tensor4D};
use crate::domain::volume::Volume;
use ndarray::s;

/// Recorded parameters of one crop application, consumed by the inverse pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropRecord {
    /// Origin of the crop box in the pre-crop grid.
    pub origin: [usize; 3],
    /// Size of the crop box.
    pub size: [usize; 3],
    /// Spatial shape of the volume before cropping.
    pub full_shape: [usize; 3],
}

/// Crops a volume to the bounding box of its foreground.
///
/// Foreground is every voxel of the source channel strictly above the
/// background threshold. Cropping an already-cropped volume returns the
/// same bounding box (idempotent).
#[derive(Debug, Clone)]
pub struct CropForeground {
    /// Channel inspected for foreground content.
    source_channel: usize,
    /// Values at or below this threshold count as background.
    threshold: f32,
    /// Extra margin kept around the bounding box, clamped to the volume.
    margin: usize,
}

impl Default for CropForeground {
    fn default() -> Self {
        Self {
            source_channel: 0,
            threshold: 0.0,
            margin: 0,
        }
    }
}

impl CropForeground {
    /// Creates a CropForeground with the given source channel, threshold,
    /// and margin.
    pub fn new(source_channel: usize, threshold: f32, margin: usize) -> Self {
        Self {
            source_channel,
            threshold,
            margin,
        }
    }

    /// Computes the foreground bounding box of a volume as (origin, size).
    ///
    /// An all-background volume keeps the full extent; there is nothing
    /// meaningful to crop and downstream steps require non-empty volumes.
    ///
    /// # Errors
    ///
    /// Returns an invalid input error if the source channel does not exist.
    pub fn bounding_box(&self, data: &Tensor4D) -> Result<([usize; 3], [usize; 3]), SegError> {
        let (channels, d, h, w) = data.dim();
        if self.source_channel >= channels {
            return Err(SegError::invalid_input(format!(
                "crop source channel {} out of range for {} channel volume",
                self.source_channel, channels
            )));
        }

        let mut min = [d, h, w];
        let mut max = [0usize; 3];
        let mut any = false;
        let channel = data.index_axis(ndarray::Axis(0), self.source_channel);
        for ((z, y, x), &value) in channel.indexed_iter() {
            if value > self.threshold {
                any = true;
                let idx = [z, y, x];
                for axis in 0..3 {
                    min[axis] = min[axis].min(idx[axis]);
                    max[axis] = max[axis].max(idx[axis]);
                }
            }
        }

        if !any {
            return Ok(([0, 0, 0], [d, h, w]));
        }

        let shape = [d, h, w];
        let mut origin = [0usize; 3];
        let mut size = [0usize; 3];
        for axis in 0..3 {
            origin[axis] = min[axis].saturating_sub(self.margin);
            let end = (max[axis] + 1 + self.margin).min(shape[axis]);
            size[axis] = end - origin[axis];
        }
        Ok((origin, size))
    }

    /// Crops the volume to its foreground bounding box.
    ///
    /// The affine origin shifts by the world-space offset of the crop
    /// origin; spacing and orientation are unchanged.
    pub fn apply(&self, volume: Volume) -> Result<(Volume, CropRecord), SegError> {
        let full_shape = volume.spatial_shape();
        let (origin, size) = self.bounding_box(&volume.data)?;

        let record = CropRecord {
            origin,
            size,
            full_shape,
        };
        if origin == [0, 0, 0] && size == full_shape {
            return Ok((volume, record));
        }

        let data = volume
            .data
            .slice(s![
                ..,
                origin[0]..origin[0] + size[0],
                origin[1]..origin[1] + size[1],
                origin[2]..origin[2] + size[2]
            ])
            .to_owned();

        let mut geometry = volume.geometry;
        let shifted = geometry
            .affine
            .apply([origin[0] as f64, origin[1] as f64, origin[2] as f64]);
        geometry.affine.set_origin(shifted);

        Ok((Volume { data, geometry }, record))
    }

    /// Pads a label map back into the pre-crop extent at the recorded origin.
    ///
    /// Voxels outside the crop box get class 0 (background).
    ///
    /// # Errors
    ///
    /// Returns a consistency error if the label shape does not match the
    /// recorded crop size.
    pub fn invert_labels(labels: LabelTensor, record: &CropRecord) -> Result<LabelTensor, SegError> {
        let (d, h, w) = labels.dim();
        if [d, h, w] != record.size {
            return Err(SegError::consistency(format!(
                "crop inverse expects labels of shape {:?}, got [{d}, {h}, {w}]",
                record.size
            )));
        }
        if record.origin == [0, 0, 0] && record.size == record.full_shape {
            return Ok(labels);
        }

        let mut full = LabelTensor::zeros((
            record.full_shape[0],
            record.full_shape[1],
            record.full_shape[2],
        ));
        full.slice_mut(s![
            record.origin[0]..record.origin[0] + record.size[0],
            record.origin[1]..record.origin[1] + record.size[1],
            record.origin[2]..record.origin[2] + record.size[2]
        ])
        .assign(&labels);
        Ok(full)
    }
}
