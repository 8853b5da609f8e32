//! The composed pre-processing pipeline and its inverse.
//!
//! The forward pass applies a fixed sequence of steps — intensity scaling,
//! foreground crop, canonical reorientation, spacing resampling — and
//! records the parameters of every geometry-affecting step on an ordered
//! trace. The inverse pass pops the trace in exact reverse order to map a
//! label volume back into the original crop, orientation, and spacing.
//! Intensity scaling is one-way and records nothing: the inverse restores
//! geometry, never intensities.

use crate::core::config::SegmentationConfig;
use crate::core::errors::SegError;
use crate::core::tensor::LabelTensor;
use crate::domain::volume::Volume;
use crate::processors::crop::{CropForeground, CropRecord};
use crate::processors::intensity::ScaleIntensityRange;
use crate::processors::orientation::{OrientRecord, OrientToCanonical};
use crate::processors::spacing::{ResampleRecord, ResampleToSpacing};
use tracing::debug;

/// One recorded geometry-affecting step.
#[derive(Debug, Clone)]
pub enum TraceStep {
    /// Foreground crop parameters.
    Crop(CropRecord),
    /// Reorientation parameters.
    Orient(OrientRecord),
    /// Resampling parameters.
    Resample(ResampleRecord),
}

impl TraceStep {
    fn name(&self) -> &'static str {
        match self {
            TraceStep::Crop(_) => "crop",
            TraceStep::Orient(_) => "orient",
            TraceStep::Resample(_) => "resample",
        }
    }
}

/// The ordered stack of recorded transform parameters for one request.
///
/// Request-scoped: produced by the forward pass, consumed by the inverse
/// pass, then discarded.
#[derive(Debug, Clone, Default)]
pub struct TransformTrace {
    steps: Vec<TraceStep>,
}

impl TransformTrace {
    fn push(&mut self, step: TraceStep) {
        self.steps.push(step);
    }

    fn pop(&mut self) -> Option<TraceStep> {
        self.steps.pop()
    }

    /// The number of recorded steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no steps were recorded.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// The fixed pre-processing sequence applied before inference.
#[derive(Debug, Clone)]
pub struct PreTransforms {
    intensity: ScaleIntensityRange,
    crop: CropForeground,
    orient: OrientToCanonical,
    resample: ResampleToSpacing,
}

impl PreTransforms {
    /// Builds the pipeline from a validated configuration.
    pub fn from_config(config: &SegmentationConfig) -> Result<Self, SegError> {
        Ok(Self {
            intensity: ScaleIntensityRange::new(&config.intensity)?,
            crop: CropForeground::default(),
            orient: OrientToCanonical::new(crate::domain::geometry::parse_axcodes(
                &config.orientation,
            )?),
            resample: ResampleToSpacing::new(config.target_spacing)?,
        })
    }

    /// Applies the forward sequence, returning the normalized volume and
    /// the trace needed to invert it.
    pub fn apply(&self, volume: Volume) -> Result<(Volume, TransformTrace), SegError> {
        let mut trace = TransformTrace::default();

        let mut volume = volume;
        self.intensity.apply(&mut volume.data);

        let (volume, crop_record) = self.crop.apply(volume)?;
        trace.push(TraceStep::Crop(crop_record));

        let (volume, orient_record) = self.orient.apply(volume)?;
        trace.push(TraceStep::Orient(orient_record));

        let (volume, resample_record) = self.resample.apply(volume)?;
        trace.push(TraceStep::Resample(resample_record));

        debug!(
            shape = ?volume.spatial_shape(),
            spacing = ?volume.geometry.spacing,
            "pre-transforms applied"
        );
        Ok((volume, trace))
    }

    /// Pops the trace in reverse order, mapping a label map back into the
    /// original crop window, orientation, and spacing.
    ///
    /// # Errors
    ///
    /// Returns a consistency error if the trace does not contain exactly
    /// the steps the forward pass records, in order.
    pub fn invert(
        &self,
        labels: LabelTensor,
        mut trace: TransformTrace,
    ) -> Result<LabelTensor, SegError> {
        let labels = match trace.pop() {
            Some(TraceStep::Resample(record)) => ResampleToSpacing::invert_labels(labels, &record),
            other => return Err(unexpected_step("resample", other)),
        };
        let labels = match trace.pop() {
            Some(TraceStep::Orient(record)) => OrientToCanonical::invert_labels(labels, &record),
            other => return Err(unexpected_step("orient", other)),
        };
        let labels = match trace.pop() {
            Some(TraceStep::Crop(record)) => CropForeground::invert_labels(labels, &record)?,
            other => return Err(unexpected_step("crop", other)),
        };
        if let Some(step) = trace.pop() {
            return Err(SegError::consistency(format!(
                "transform trace has unexpected trailing step '{}'",
                step.name()
            )));
        }
        Ok(labels)
    }
}

fn unexpected_step(expected: &str, got: Option<TraceStep>) -> SegError {
    SegError::consistency(match got {
        Some(step) => format!(
            "transform trace out of order: expected '{expected}', found '{}'",
            step.name()
        ),
        None => format!("transform trace exhausted while expecting '{expected}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::{Affine, Geometry, parse_axcodes};
    use ndarray::{Array4, s};

    fn config() -> SegmentationConfig {
        let mut config = SegmentationConfig::for_model("model.onnx", 2);
        config.target_spacing = [1.0, 1.0, 1.0];
        config
    }

    fn synthetic_volume(axcodes: &str, spacing: [f64; 3]) -> Volume {
        // A soft-tissue blob in air. Air clips to the lower intensity
        // bound, so the foreground crop shrinks to the blob.
        let mut data = Array4::from_elem((1, 12, 14, 16), -1000.0);
        data.slice_mut(s![0, 3..9, 4..10, 5..11]).fill(100.0);
        let geometry = Geometry::new(
            spacing,
            parse_axcodes(axcodes).unwrap(),
            Affine::from_spacing(spacing),
        )
        .unwrap();
        Volume::new(data, geometry).unwrap()
    }

    #[test]
    fn test_forward_records_three_steps() {
        let transforms = PreTransforms::from_config(&config()).unwrap();
        let (out, trace) = transforms.apply(synthetic_volume("RAS", [1.0, 1.0, 1.0])).unwrap();
        assert_eq!(trace.len(), 3);
        // Cropped to the 6^3 blob.
        assert_eq!(out.spatial_shape(), [6, 6, 6]);
        // Intensities are rescaled into [0, 1].
        assert!(out.data.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_round_trip_restores_original_shape() {
        for (axcodes, spacing) in [
            ("RAS", [1.0, 1.0, 1.0]),
            ("LPS", [2.0, 1.0, 1.5]),
            ("SRA", [1.0, 2.0, 1.0]),
        ] {
            let volume = synthetic_volume(axcodes, spacing);
            let original_shape = volume.spatial_shape();
            let transforms = PreTransforms::from_config(&config()).unwrap();
            let (out, trace) = transforms.apply(volume).unwrap();

            // Pretend the model labeled every voxel class 1.
            let labels = LabelTensor::from_elem(
                (out.spatial_shape()[0], out.spatial_shape()[1], out.spatial_shape()[2]),
                1,
            );
            let restored = transforms.invert(labels, trace).unwrap();
            let (d, h, w) = restored.dim();
            assert_eq!(
                [d, h, w], original_shape,
                "round trip failed for {axcodes} at {spacing:?}"
            );
        }
    }

    #[test]
    fn test_round_trip_places_labels_at_crop_position() {
        let volume = synthetic_volume("RAS", [1.0, 1.0, 1.0]);
        let transforms = PreTransforms::from_config(&config()).unwrap();
        let (out, trace) = transforms.apply(volume).unwrap();
        let shape = out.spatial_shape();
        let labels = LabelTensor::from_elem((shape[0], shape[1], shape[2]), 1);
        let restored = transforms.invert(labels, trace).unwrap();

        // Labels land exactly on the cropped blob; background stays 0.
        assert_eq!(restored[[3, 4, 5]], 1);
        assert_eq!(restored[[8, 9, 10]], 1);
        assert_eq!(restored[[0, 0, 0]], 0);
        assert_eq!(restored[[11, 13, 15]], 0);
    }

    #[test]
    fn test_invert_rejects_reordered_trace() {
        let transforms = PreTransforms::from_config(&config()).unwrap();
        let (out, _) = transforms.apply(synthetic_volume("RAS", [1.0, 1.0, 1.0])).unwrap();
        let shape = out.spatial_shape();
        let labels = LabelTensor::from_elem((shape[0], shape[1], shape[2]), 1);

        // A trace missing its resample step must be rejected.
        let mut bad = TransformTrace::default();
        bad.push(TraceStep::Crop(CropRecord {
            origin: [0, 0, 0],
            size: shape,
            full_shape: shape,
        }));
        match transforms.invert(labels, bad) {
            Err(SegError::Consistency { .. }) => {}
            other => panic!("expected consistency error, got {other:?}"),
        }
    }
}
