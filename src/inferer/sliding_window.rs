//! The sliding-window inference engine.
//!
//! Partitions a volume too large for one forward pass into overlapping
//! windows, runs the classifier on batches of windows, and reassembles a
//! single coherent logit volume through the blend accumulator. Windows are
//! data-independent, so batches may run sequentially or across a rayon
//! pool; the output is independent of the grouping because accumulation
//! commutes and each window is added exactly once.

use crate::core::config::{BlendMode, SegmentationConfig};
use crate::core::errors::SegError;
use crate::core::tensor::{Tensor4D, Tensor5D};
use crate::core::traits::VoxelClassifier;
use crate::inferer::blend::{BlendAccumulator, importance_map};
use crate::inferer::tiling::{GridWindow, TilingPlan};
use crate::processors::pad::{crop_back, pad_to_min};
use ndarray::{Axis, s};
use rayon::prelude::*;
use std::sync::Mutex;
use tracing::debug;

/// Sliding-window inference over a volume.
#[derive(Debug, Clone)]
pub struct SlidingWindowInferer {
    roi_size: [usize; 3],
    overlap: f64,
    sw_batch_size: usize,
    num_classes: usize,
    blend_mode: BlendMode,
    sigma_scale: f64,
    parallel: bool,
}

impl SlidingWindowInferer {
    /// Creates a new inferer.
    ///
    /// # Arguments
    ///
    /// * `roi_size` - Window size; the model's expected input shape.
    /// * `overlap` - Fraction of window extent shared between neighbors.
    /// * `sw_batch_size` - Windows submitted to the model per call.
    /// * `num_classes` - Expected class count K of the model output.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty roi, zero batch size, or
    /// overlap outside `[0, 1)`.
    pub fn new(
        roi_size: [usize; 3],
        overlap: f64,
        sw_batch_size: usize,
        num_classes: usize,
    ) -> Result<Self, SegError> {
        if roi_size.contains(&0) {
            return Err(SegError::config("roi_size must be positive on every axis"));
        }
        if !overlap.is_finite() || !(0.0..1.0).contains(&overlap) {
            return Err(SegError::config(format!(
                "overlap must be in [0, 1), got {overlap}"
            )));
        }
        if sw_batch_size == 0 {
            return Err(SegError::config("sw_batch_size must be greater than 0"));
        }
        if num_classes == 0 {
            return Err(SegError::config("num_classes must be at least 1"));
        }
        Ok(Self {
            roi_size,
            overlap,
            sw_batch_size,
            num_classes,
            blend_mode: BlendMode::Constant,
            sigma_scale: 0.125,
            parallel: false,
        })
    }

    /// Creates an inferer from a validated pipeline configuration.
    pub fn from_config(config: &SegmentationConfig) -> Result<Self, SegError> {
        let mut inferer = Self::new(
            config.roi_size,
            config.overlap,
            config.sw_batch_size,
            config.model.num_classes,
        )?;
        inferer.blend_mode = config.blend_mode;
        inferer.sigma_scale = config.sigma_scale;
        inferer.parallel = config.parallel;
        Ok(inferer)
    }

    /// Selects the blend mode for overlapping windows.
    pub fn with_blend_mode(mut self, mode: BlendMode, sigma_scale: f64) -> Self {
        self.blend_mode = mode;
        self.sigma_scale = sigma_scale;
        self
    }

    /// Enables or disables parallel window-batch execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Runs tiled inference over a `[C, D, H, W]` volume and returns the
    /// blended logits `[K, D, H, W]` with the input's spatial shape.
    ///
    /// The volume is padded up to the window size when undersized and the
    /// padding is cropped back off the result.
    pub fn infer(
        &self,
        data: &Tensor4D,
        classifier: &dyn VoxelClassifier,
    ) -> Result<Tensor4D, SegError> {
        if classifier.num_classes() != self.num_classes {
            return Err(SegError::config(format!(
                "classifier reports {} classes, inferer configured for {}",
                classifier.num_classes(),
                self.num_classes
            )));
        }

        let (padded, pad_record) = pad_to_min(data.clone(), self.roi_size);
        let (_, pd, ph, pw) = padded.dim();
        let plan = TilingPlan::new([pd, ph, pw], self.roi_size, self.overlap)?;
        debug!(
            windows = plan.len(),
            padded_shape = ?[pd, ph, pw],
            batch = self.sw_batch_size,
            parallel = self.parallel,
            "sliding-window plan ready"
        );

        let importance = importance_map(self.blend_mode, self.roi_size, self.sigma_scale);
        let accumulator =
            BlendAccumulator::new([pd, ph, pw], self.num_classes, importance)?;

        let accumulator = if self.parallel {
            let shared = Mutex::new(accumulator);
            plan.windows()
                .par_chunks(self.sw_batch_size)
                .try_for_each(|chunk| -> Result<(), SegError> {
                    let logits = self.predict_chunk(&padded, chunk, classifier)?;
                    let mut guard = shared
                        .lock()
                        .map_err(|_| SegError::consistency("blend accumulator lock poisoned"))?;
                    for (i, window) in chunk.iter().enumerate() {
                        guard.add(window, logits.index_axis(Axis(0), i))?;
                    }
                    Ok(())
                })?;
            shared
                .into_inner()
                .map_err(|_| SegError::consistency("blend accumulator lock poisoned"))?
        } else {
            let mut accumulator = accumulator;
            for chunk in plan.windows().chunks(self.sw_batch_size) {
                let logits = self.predict_chunk(&padded, chunk, classifier)?;
                for (i, window) in chunk.iter().enumerate() {
                    accumulator.add(window, logits.index_axis(Axis(0), i))?;
                }
            }
            accumulator
        };

        let blended = accumulator.finalize()?;
        Ok(crop_back(blended, &pad_record))
    }

    /// Stacks a chunk of windows into a batch, runs the classifier, and
    /// validates the output shape.
    fn predict_chunk(
        &self,
        padded: &Tensor4D,
        chunk: &[GridWindow],
        classifier: &dyn VoxelClassifier,
    ) -> Result<Tensor5D, SegError> {
        let channels = padded.dim().0;
        let [rd, rh, rw] = self.roi_size;
        let mut batch = Tensor5D::zeros((chunk.len(), channels, rd, rh, rw));
        for (i, window) in chunk.iter().enumerate() {
            let [o0, o1, o2] = window.origin;
            batch
                .index_axis_mut(Axis(0), i)
                .assign(&padded.slice(s![.., o0..o0 + rd, o1..o1 + rh, o2..o2 + rw]));
        }

        let logits = classifier.predict_batch(&batch)?;
        let dims = logits.dim();
        if dims.0 != chunk.len()
            || dims.1 != self.num_classes
            || (dims.2, dims.3, dims.4) != (rd, rh, rw)
        {
            return Err(SegError::consistency(format!(
                "classifier returned shape {:?}, expected [{}, {}, {rd}, {rh}, {rw}]",
                dims,
                chunk.len(),
                self.num_classes
            )));
        }
        Ok(logits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array4, Array5};

    /// Returns its input unchanged as single-class logits.
    struct IdentityClassifier;

    impl VoxelClassifier for IdentityClassifier {
        fn num_classes(&self) -> usize {
            1
        }

        fn predict_batch(&self, batch: &Tensor5D) -> Result<Tensor5D, SegError> {
            Ok(batch.clone())
        }
    }

    /// Produces a fixed per-class constant so argmax is predictable.
    struct ConstantClassifier {
        classes: usize,
    }

    impl VoxelClassifier for ConstantClassifier {
        fn num_classes(&self) -> usize {
            self.classes
        }

        fn predict_batch(&self, batch: &Tensor5D) -> Result<Tensor5D, SegError> {
            let (n, _, d, h, w) = batch.dim();
            Ok(Array5::from_shape_fn(
                (n, self.classes, d, h, w),
                |(_, k, _, _, _)| k as f32,
            ))
        }
    }

    struct FailingClassifier;

    impl VoxelClassifier for FailingClassifier {
        fn num_classes(&self) -> usize {
            1
        }

        fn predict_batch(&self, _batch: &Tensor5D) -> Result<Tensor5D, SegError> {
            Err(SegError::model_invocation(
                "forward pass failed",
                crate::core::errors::SimpleError::new("synthetic failure"),
            ))
        }
    }

    #[test]
    fn test_identity_model_reconstructs_constant_volume() {
        // The reference scenario: 10^3 constant volume of 5, window 6,
        // overlap 0.5, identity model -> constant 5 everywhere.
        let data = Array4::from_elem((1, 10, 10, 10), 5.0f32);
        let inferer = SlidingWindowInferer::new([6, 6, 6], 0.5, 4, 1).unwrap();
        let out = inferer.infer(&data, &IdentityClassifier).unwrap();
        assert_eq!(out.dim(), (1, 10, 10, 10));
        assert!(out.iter().all(|&v| (v - 5.0).abs() < 1e-5));
    }

    #[test]
    fn test_identity_model_reconstructs_structured_volume() {
        let data = Array4::from_shape_fn((1, 12, 10, 8), |(_, z, y, x)| (z * 80 + y * 8 + x) as f32);
        let inferer = SlidingWindowInferer::new([6, 6, 6], 0.25, 3, 1).unwrap();
        let out = inferer.infer(&data, &IdentityClassifier).unwrap();
        let max_err = out
            .iter()
            .zip(data.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_err < 1e-3, "max blend error {max_err}");
    }

    #[test]
    fn test_undersized_volume_is_padded() {
        let data = Array4::from_elem((1, 4, 3, 5), 2.0f32);
        let inferer = SlidingWindowInferer::new([6, 6, 6], 0.25, 2, 1).unwrap();
        let out = inferer.infer(&data, &IdentityClassifier).unwrap();
        // Output matches the original, unpadded shape.
        assert_eq!(out.dim(), (1, 4, 3, 5));
        assert!(out.iter().all(|&v| (v - 2.0).abs() < 1e-5));
    }

    #[test]
    fn test_output_independent_of_batch_size_and_parallelism() {
        let data = Array4::from_shape_fn((1, 10, 10, 10), |(_, z, y, x)| {
            (z as f32).sin() + (y as f32) * 0.1 + (x as f32) * 0.01
        });
        let reference = SlidingWindowInferer::new([6, 6, 6], 0.5, 1, 1)
            .unwrap()
            .infer(&data, &IdentityClassifier)
            .unwrap();

        for batch in [2, 4, 27] {
            for parallel in [false, true] {
                let out = SlidingWindowInferer::new([6, 6, 6], 0.5, batch, 1)
                    .unwrap()
                    .with_parallel(parallel)
                    .infer(&data, &IdentityClassifier)
                    .unwrap();
                let max_err = out
                    .iter()
                    .zip(reference.iter())
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0f32, f32::max);
                assert!(
                    max_err < 1e-5,
                    "batch {batch} parallel {parallel}: max error {max_err}"
                );
            }
        }
    }

    #[test]
    fn test_gaussian_blend_still_reconstructs_constant() {
        let data = Array4::from_elem((1, 10, 10, 10), 5.0f32);
        let inferer = SlidingWindowInferer::new([6, 6, 6], 0.5, 4, 1)
            .unwrap()
            .with_blend_mode(BlendMode::Gaussian, 0.125);
        let out = inferer.infer(&data, &IdentityClassifier).unwrap();
        assert!(out.iter().all(|&v| (v - 5.0).abs() < 1e-4));
    }

    #[test]
    fn test_multi_class_logits_shape() {
        let data = Array4::from_elem((1, 8, 8, 8), 1.0f32);
        let inferer = SlidingWindowInferer::new([6, 6, 6], 0.25, 2, 3).unwrap();
        let out = inferer
            .infer(&data, &ConstantClassifier { classes: 3 })
            .unwrap();
        assert_eq!(out.dim(), (3, 8, 8, 8));
        // Class k logit is k everywhere after blending.
        assert!((out[[2, 4, 4, 4]] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_model_failure_aborts_run() {
        let data = Array4::from_elem((1, 8, 8, 8), 1.0f32);
        let inferer = SlidingWindowInferer::new([6, 6, 6], 0.25, 2, 1).unwrap();
        match inferer.infer(&data, &FailingClassifier) {
            Err(SegError::ModelInvocation { .. }) => {}
            other => panic!("expected model invocation error, got {other:?}"),
        }
    }

    #[test]
    fn test_class_count_mismatch_is_config_error() {
        let data = Array4::from_elem((1, 8, 8, 8), 1.0f32);
        let inferer = SlidingWindowInferer::new([6, 6, 6], 0.25, 2, 5).unwrap();
        assert!(inferer.infer(&data, &IdentityClassifier).is_err());
    }
}
