//! Intensity clipping and rescaling.
//!
//! Maps raw scanner units into the fixed range the model was trained on:
//! samples are clipped to `[a_min, a_max]` and linearly rescaled to
//! `[b_min, b_max]`. The clipping makes this step one-way; the inverse
//! pipeline restores geometry only, never intensities.

use crate::core::config::IntensityRange;
use crate::core::errors::SegError;
use crate::core::tensor::Tensor4D;

/// Clips and rescales voxel intensities.
///
/// The linear map is precomputed once from the configured range; applying
/// the step twice with the same parameters is idempotent on the clipped
/// output range.
#[derive(Debug, Clone)]
pub struct ScaleIntensityRange {
    a_min: f32,
    a_max: f32,
    b_min: f32,
    /// Precomputed (b_max - b_min) / (a_max - a_min).
    scale: f32,
}

impl ScaleIntensityRange {
    /// Creates a new ScaleIntensityRange from the configured range.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if either range is empty or reversed,
    /// or any bound is not finite.
    pub fn new(range: &IntensityRange) -> Result<Self, SegError> {
        for (name, v) in [
            ("a_min", range.a_min),
            ("a_max", range.a_max),
            ("b_min", range.b_min),
            ("b_max", range.b_max),
        ] {
            if !v.is_finite() {
                return Err(SegError::config(format!(
                    "intensity bound {name} must be finite, got {v}"
                )));
            }
        }
        if range.a_min >= range.a_max {
            return Err(SegError::config(format!(
                "intensity a_min ({}) must be below a_max ({})",
                range.a_min, range.a_max
            )));
        }
        if range.b_min >= range.b_max {
            return Err(SegError::config(format!(
                "intensity b_min ({}) must be below b_max ({})",
                range.b_min, range.b_max
            )));
        }
        Ok(Self {
            a_min: range.a_min,
            a_max: range.a_max,
            b_min: range.b_min,
            scale: (range.b_max - range.b_min) / (range.a_max - range.a_min),
        })
    }

    /// Maps a single sample through the clip-and-rescale function.
    pub fn map(&self, value: f32) -> f32 {
        let clipped = value.clamp(self.a_min, self.a_max);
        (clipped - self.a_min) * self.scale + self.b_min
    }

    /// Applies the mapping to a whole volume in place.
    pub fn apply(&self, data: &mut Tensor4D) {
        data.mapv_inplace(|v| self.map(v));
    }
}
