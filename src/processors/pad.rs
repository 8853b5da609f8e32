//! Symmetric spatial padding for undersized volumes.
//!
//! A volume smaller than the sliding window along any axis is padded
//! symmetrically with edge-replicated values before tiling, and the
//! padding is cropped back off the accumulated logits afterwards. Edge
//! replication avoids injecting an artificial background level at the
//! borders of the model input.

use crate::core::tensor::Tensor4D;
use ndarray::{Array4, s};

/// Recorded parameters of one padding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadRecord {
    /// Padding added before the data along each spatial axis.
    pub before: [usize; 3],
    /// Spatial shape before padding.
    pub unpadded: [usize; 3],
}

impl PadRecord {
    /// Whether no padding was applied.
    pub fn is_identity(&self) -> bool {
        self.before == [0, 0, 0]
    }
}

/// Pads the volume so every spatial axis reaches at least `min_shape`,
/// splitting the padding evenly with the remainder after the data.
pub fn pad_to_min(data: Tensor4D, min_shape: [usize; 3]) -> (Tensor4D, PadRecord) {
    let (channels, d, h, w) = data.dim();
    let unpadded = [d, h, w];

    let mut before = [0usize; 3];
    let mut padded_shape = unpadded;
    let mut needed = false;
    for axis in 0..3 {
        if unpadded[axis] < min_shape[axis] {
            let total = min_shape[axis] - unpadded[axis];
            before[axis] = total / 2;
            padded_shape[axis] = min_shape[axis];
            needed = true;
        }
    }

    let record = PadRecord { before, unpadded };
    if !needed {
        return (data, record);
    }

    let padded = Array4::from_shape_fn(
        (channels, padded_shape[0], padded_shape[1], padded_shape[2]),
        |(c, z, y, x)| {
            let src = [z, y, x];
            let mut idx = [0usize; 3];
            for axis in 0..3 {
                // Edge replication: clamp into the original extent.
                idx[axis] = src[axis]
                    .saturating_sub(before[axis])
                    .min(unpadded[axis] - 1);
            }
            data[[c, idx[0], idx[1], idx[2]]]
        },
    );
    (padded, record)
}

/// Crops a padded `[K, D, H, W]` tensor back to the pre-pad extent.
pub fn crop_back(data: Tensor4D, record: &PadRecord) -> Tensor4D {
    if record.is_identity() {
        let (_, d, h, w) = data.dim();
        if [d, h, w] == record.unpadded {
            return data;
        }
    }
    data.slice(s![
        ..,
        record.before[0]..record.before[0] + record.unpadded[0],
        record.before[1]..record.before[1] + record.unpadded[1],
        record.before[2]..record.before[2] + record.unpadded[2]
    ])
    .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_padding_when_large_enough() {
        let data = Array4::from_elem((1, 8, 8, 8), 2.0f32);
        let (padded, record) = pad_to_min(data.clone(), [6, 6, 6]);
        assert!(record.is_identity());
        assert_eq!(padded, data);
    }

    #[test]
    fn test_symmetric_edge_padding() {
        let data = Array4::from_shape_fn((1, 3, 6, 6), |(_, z, _, _)| z as f32);
        let (padded, record) = pad_to_min(data, [6, 6, 6]);
        assert_eq!(padded.dim(), (1, 6, 6, 6));
        assert_eq!(record.before, [1, 0, 0]);
        // Replicated edges: first padded slice copies z=0, trailing ones z=2.
        assert_eq!(padded[[0, 0, 0, 0]], 0.0);
        assert_eq!(padded[[0, 1, 0, 0]], 0.0);
        assert_eq!(padded[[0, 4, 0, 0]], 2.0);
        assert_eq!(padded[[0, 5, 0, 0]], 2.0);
    }

    #[test]
    fn test_crop_back_round_trip() {
        let data = Array4::from_shape_fn((2, 3, 4, 5), |(c, z, y, x)| (c + z + y + x) as f32);
        let (padded, record) = pad_to_min(data.clone(), [7, 7, 7]);
        let restored = crop_back(padded, &record);
        assert_eq!(restored, data);
    }
}
