//! The segmentation orchestrator.
//!
//! Ties the pipeline together for one request: pre-transforms forward,
//! sliding-window inference against the opaque classifier, argmax over the
//! blended logits, and the inverse transform pass restoring the original
//! crop window, orientation, and spacing. A run either completes with a
//! label volume in the input's coordinate frame or fails with a
//! [`SegError`]; partial results are never returned.

use crate::core::config::SegmentationConfig;
use crate::core::errors::SegError;
use crate::core::inference::OrtClassifier;
use crate::core::traits::{VolumeCodec, VoxelClassifier};
use crate::domain::volume::{LabelVolume, Volume};
use crate::inferer::sliding_window::SlidingWindowInferer;
use crate::pipeline::transforms::PreTransforms;
use crate::utils::argmax_channels;
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Timing and shape statistics for one segmentation run.
#[derive(Debug, Clone)]
pub struct RunStats {
    /// Number of windows the tiling planner produced.
    pub window_count: usize,
    /// Spatial shape of the volume handed to the inferer, after padding.
    pub inference_shape: [usize; 3],
    /// Milliseconds spent in the forward transform pass.
    pub preprocess_ms: f64,
    /// Milliseconds spent in sliding-window inference.
    pub inference_ms: f64,
    /// Milliseconds spent in argmax and the inverse transform pass.
    pub postprocess_ms: f64,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} windows over {:?}: pre {:.1}ms, infer {:.1}ms, post {:.1}ms",
            self.window_count,
            self.inference_shape,
            self.preprocess_ms,
            self.inference_ms,
            self.postprocess_ms
        )
    }
}

/// The classifier, loaded eagerly or on first use depending on `preload`.
enum ModelHandle {
    Ready(Arc<dyn VoxelClassifier>),
    Deferred {
        config: SegmentationConfig,
        cell: OnceCell<Arc<dyn VoxelClassifier>>,
    },
}

impl ModelHandle {
    fn get(&self) -> Result<Arc<dyn VoxelClassifier>, SegError> {
        match self {
            ModelHandle::Ready(classifier) => Ok(classifier.clone()),
            ModelHandle::Deferred { config, cell } => cell
                .get_or_try_init(|| {
                    info!(model = %config.model.path.display(), "loading model on first use");
                    let classifier = OrtClassifier::from_config(&config.model)?;
                    Ok(Arc::new(classifier) as Arc<dyn VoxelClassifier>)
                })
                .map(Arc::clone),
        }
    }
}

/// Runs whole-volume segmentation requests.
///
/// Constructed once from a validated configuration; each [`Segmenter::run`]
/// owns its blend buffers exclusively, so a segmenter may serve concurrent
/// requests against the shared, read-only classifier.
pub struct Segmenter {
    transforms: PreTransforms,
    inferer: SlidingWindowInferer,
    model: ModelHandle,
    roi_size: [usize; 3],
    overlap: f64,
}

impl Segmenter {
    /// Creates a segmenter whose classifier is the configured ONNX model,
    /// loaded eagerly when `preload` is set and on first use otherwise.
    pub fn from_config(config: SegmentationConfig) -> Result<Self, SegError> {
        config.validate()?;
        let model = if config.preload {
            let classifier = OrtClassifier::from_config(&config.model)?;
            ModelHandle::Ready(Arc::new(classifier))
        } else {
            ModelHandle::Deferred {
                config: config.clone(),
                cell: OnceCell::new(),
            }
        };
        Self::build(config, model)
    }

    /// Creates a segmenter around an injected classifier, bypassing the
    /// ONNX backend. This is the seam the test suite uses to substitute
    /// deterministic stubs.
    pub fn with_classifier(
        config: SegmentationConfig,
        classifier: Arc<dyn VoxelClassifier>,
    ) -> Result<Self, SegError> {
        config.validate()?;
        if classifier.num_classes() != config.model.num_classes {
            return Err(SegError::config(format!(
                "classifier reports {} classes, configuration says {}",
                classifier.num_classes(),
                config.model.num_classes
            )));
        }
        Self::build(config, ModelHandle::Ready(classifier))
    }

    fn build(config: SegmentationConfig, model: ModelHandle) -> Result<Self, SegError> {
        Ok(Self {
            transforms: PreTransforms::from_config(&config)?,
            inferer: SlidingWindowInferer::from_config(&config)?,
            model,
            roi_size: config.roi_size,
            overlap: config.overlap,
        })
    }

    /// Segments a volume, returning per-voxel class labels in the input
    /// volume's original geometry.
    pub fn run(&self, volume: Volume) -> Result<LabelVolume, SegError> {
        self.run_with_stats(volume).map(|(labels, _)| labels)
    }

    /// Segments a volume and reports per-stage statistics.
    pub fn run_with_stats(&self, volume: Volume) -> Result<(LabelVolume, RunStats), SegError> {
        let input_shape = volume.spatial_shape();
        let input_geometry = volume.geometry.clone();

        let start = Instant::now();
        let (transformed, trace) = self.transforms.apply(volume)?;
        let preprocess_ms = start.elapsed().as_secs_f64() * 1e3;

        let inference_shape = padded_shape(transformed.spatial_shape(), self.roi_size);
        let window_count =
            crate::inferer::tiling::TilingPlan::new(inference_shape, self.roi_size, self.overlap)?
                .len();

        let start = Instant::now();
        let classifier = self.model.get()?;
        let logits = self.inferer.infer(&transformed.data, classifier.as_ref())?;
        let inference_ms = start.elapsed().as_secs_f64() * 1e3;

        let start = Instant::now();
        // Discretize only after blending; argmax before the inverse pass
        // so resampling back uses label-preserving interpolation.
        let labels = argmax_channels(&logits);
        let restored = self.transforms.invert(labels, trace)?;
        let postprocess_ms = start.elapsed().as_secs_f64() * 1e3;

        let (d, h, w) = restored.dim();
        if [d, h, w] != input_shape {
            return Err(SegError::consistency(format!(
                "inverse pipeline produced shape [{d}, {h}, {w}], input was {input_shape:?}"
            )));
        }

        let stats = RunStats {
            window_count,
            inference_shape,
            preprocess_ms,
            inference_ms,
            postprocess_ms,
        };
        info!(%stats, "segmentation run complete");

        Ok((
            LabelVolume {
                data: restored,
                geometry: input_geometry,
            },
            stats,
        ))
    }

    /// Reads a volume through the codec, segments it, and writes the label
    /// volume back out.
    pub fn run_file<C>(&self, codec: &C, input: &Path, output: &Path) -> Result<RunStats, SegError>
    where
        C: VolumeCodec<Error = SegError>,
    {
        let volume = codec.read(input)?;
        let (labels, stats) = self.run_with_stats(volume)?;
        codec.write_labels(&labels, output)?;
        Ok(stats)
    }
}

fn padded_shape(shape: [usize; 3], roi_size: [usize; 3]) -> [usize; 3] {
    [
        shape[0].max(roi_size[0]),
        shape[1].max(roi_size[1]),
        shape[2].max(roi_size[2]),
    ]
}
