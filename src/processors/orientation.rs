//! Reorientation of volumes into a canonical axis convention.
//!
//! The model is trained on a fixed axis convention (RAS by default), so
//! input volumes are permuted and flipped into it before inference. The
//! permutation and flips are recorded; the inverse is exact since flips
//! are self-inverse and the permutation is simply reversed.

use crate::core::errors::SegError;
use crate::core::tensor::{LabelTensor, Tensor4D};
use crate::domain::geometry::AxisCode;
use crate::domain::volume::Volume;
use ndarray::Axis;

/// Recorded parameters of one reorientation, consumed by the inverse pass.
///
/// Output spatial axis `j` reads from input axis `perm[j]`, reversed when
/// `flip[j]` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrientRecord {
    /// Source axis for each output axis.
    pub perm: [usize; 3],
    /// Whether each output axis is reversed.
    pub flip: [bool; 3],
}

impl OrientRecord {
    /// The record undoing this reorientation.
    pub fn inverse(&self) -> OrientRecord {
        let mut perm = [0usize; 3];
        let mut flip = [false; 3];
        for (j, &src) in self.perm.iter().enumerate() {
            perm[src] = j;
            flip[src] = self.flip[j];
        }
        OrientRecord { perm, flip }
    }

    /// Whether this record is the identity (nothing to do).
    pub fn is_identity(&self) -> bool {
        self.perm == [0, 1, 2] && self.flip == [false, false, false]
    }
}

/// Permutes and flips the spatial axes of a `[C, D, H, W]` volume.
pub fn permute_and_flip4(data: &Tensor4D, record: &OrientRecord) -> Tensor4D {
    let mut view = data.view().permuted_axes([
        0,
        record.perm[0] + 1,
        record.perm[1] + 1,
        record.perm[2] + 1,
    ]);
    for (j, &flipped) in record.flip.iter().enumerate() {
        if flipped {
            view.invert_axis(Axis(j + 1));
        }
    }
    view.to_owned()
}

/// Permutes and flips the axes of a `[D, H, W]` label map.
pub fn permute_and_flip3(data: &LabelTensor, record: &OrientRecord) -> LabelTensor {
    let mut view = data
        .view()
        .permuted_axes([record.perm[0], record.perm[1], record.perm[2]]);
    for (j, &flipped) in record.flip.iter().enumerate() {
        if flipped {
            view.invert_axis(Axis(j));
        }
    }
    view.to_owned()
}

/// Reorients volumes into a fixed canonical orientation.
#[derive(Debug, Clone)]
pub struct OrientToCanonical {
    target: [AxisCode; 3],
}

impl OrientToCanonical {
    /// Creates an OrientToCanonical targeting the given axis codes.
    pub fn new(target: [AxisCode; 3]) -> Self {
        Self { target }
    }

    /// Reorients the volume into the canonical orientation, updating
    /// spacing, axis codes, and affine consistently.
    pub fn apply(&self, volume: Volume) -> Result<(Volume, OrientRecord), SegError> {
        let (perm, flip) = volume.geometry.reorientation_to(self.target)?;
        let record = OrientRecord { perm, flip };
        if record.is_identity() {
            let mut volume = volume;
            volume.geometry.axcodes = self.target;
            return Ok((volume, record));
        }

        let shape = volume.spatial_shape();
        let data = permute_and_flip4(&volume.data, &record);

        let mut geometry = volume.geometry;
        let old_spacing = geometry.spacing;
        let old_affine = geometry.affine.clone();
        let mut origin = old_affine.origin();
        for j in 0..3 {
            let src = record.perm[j];
            geometry.spacing[j] = old_spacing[src];
            let mut col = old_affine.column(src);
            if record.flip[j] {
                // Walking the reversed axis starts at the old far end.
                let len = (shape[src] as f64) - 1.0;
                for (i, o) in origin.iter_mut().enumerate() {
                    *o += col[i] * len;
                }
                for c in col.iter_mut() {
                    *c = -*c;
                }
            }
            geometry.affine.set_column(j, col);
        }
        geometry.affine.set_origin(origin);
        geometry.axcodes = self.target;

        Ok((Volume { data, geometry }, record))
    }

    /// Maps a label map back into the orientation the volume had before
    /// this step.
    pub fn invert_labels(labels: LabelTensor, record: &OrientRecord) -> LabelTensor {
        if record.is_identity() {
            return labels;
        }
        permute_and_flip3(&labels, &record.inverse())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::{Affine, Geometry, axcodes_to_string, parse_axcodes};
    use ndarray::Array4;

    fn counted_volume(axcodes: &str, spacing: [f64; 3]) -> Volume {
        let data = Array4::from_shape_fn((1, 2, 3, 4), |(_, z, y, x)| (z * 12 + y * 4 + x) as f32);
        let geometry = Geometry::new(
            spacing,
            parse_axcodes(axcodes).unwrap(),
            Affine::from_spacing(spacing),
        )
        .unwrap();
        Volume::new(data, geometry).unwrap()
    }

    #[test]
    fn test_orient_permutes_shape_and_spacing() {
        let volume = counted_volume("SRA", [3.0, 1.0, 2.0]);
        let orient = OrientToCanonical::new(parse_axcodes("RAS").unwrap());
        let (out, record) = orient.apply(volume).unwrap();
        // SRA -> RAS moves axes (S,R,A) to (R,A,S): perm = [1, 2, 0].
        assert_eq!(record.perm, [1, 2, 0]);
        assert_eq!(out.spatial_shape(), [3, 4, 2]);
        assert_eq!(out.geometry.spacing, [1.0, 2.0, 3.0]);
        assert_eq!(axcodes_to_string(out.geometry.axcodes), "RAS");
    }

    #[test]
    fn test_orient_flip_updates_affine_origin() {
        let volume = counted_volume("LAS", [1.0, 1.0, 1.0]);
        let orient = OrientToCanonical::new(parse_axcodes("RAS").unwrap());
        let (out, record) = orient.apply(volume).unwrap();
        assert_eq!(record.flip, [true, false, false]);
        // Axis 0 has 2 voxels; flipped origin lands on the old last voxel.
        assert_eq!(out.geometry.affine.origin(), [1.0, 0.0, 0.0]);
        assert_eq!(out.geometry.affine.column(0), [-1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_orient_round_trip_is_exact() {
        for axcodes in ["RAS", "LPS", "SRA", "IPL", "ALS"] {
            let volume = counted_volume(axcodes, [1.0, 1.0, 1.0]);
            let original = volume.data.clone();
            let orient = OrientToCanonical::new(parse_axcodes("RAS").unwrap());
            let (out, record) = orient.apply(volume).unwrap();

            let labels = out.data.index_axis(Axis(0), 0).mapv(|v| v as u32);
            let restored = OrientToCanonical::invert_labels(labels, &record);
            let expected = original.index_axis(Axis(0), 0).mapv(|v| v as u32);
            assert_eq!(restored, expected, "round trip failed for {axcodes}");
        }
    }

    #[test]
    fn test_record_inverse_composes_to_identity() {
        let record = OrientRecord {
            perm: [2, 0, 1],
            flip: [true, false, true],
        };
        let inv = record.inverse();
        let data = LabelTensor::from_shape_fn((2, 3, 4), |(z, y, x)| (z * 12 + y * 4 + x) as u32);
        let there = permute_and_flip3(&data, &record);
        let back = permute_and_flip3(&there, &inv);
        assert_eq!(back, data);
    }
}
