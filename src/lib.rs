//! # voxseg
//!
//! A Rust library for volumetric medical image segmentation using ONNX
//! models. Normalizes a CT volume through a reversible transform pipeline,
//! runs sliding-window inference over a 3D voxel-block classifier, blends
//! the overlapping window predictions, and maps the resulting label map
//! back into the input volume's original geometry.
//!
//! ## Features
//!
//! - Reversible pre-processing: intensity windowing, foreground cropping,
//!   canonical reorientation, and spacing resampling, each recorded on a
//!   per-request trace and inverted exactly after inference
//! - Sliding-window tiled inference with constant or gaussian blending of
//!   window overlaps
//! - ONNX Runtime integration with pooled sessions and batched window
//!   prediction
//! - MetaImage (`.mha`/`.mhd`) reading and writing
//! - TOML/JSON configuration with upfront validation
//!
//! ## Modules
//!
//! * [`core`] - Error types, configuration, tensor aliases, the classifier
//!   and codec traits, and the ONNX Runtime classifier
//! * [`domain`] - Geometry (spacing, orientation codes, affines) and volume
//!   types
//! * [`processors`] - The individual transform steps and their inverses
//! * [`inferer`] - Window planning, blending, and the sliding-window engine
//! * [`pipeline`] - The composed transform pipeline and the orchestrator
//! * [`io`] - Volume file codecs
//! * [`utils`] - Shared tensor helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use voxseg::prelude::*;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), SegError> {
//! let config = SegmentationConfig::from_file(Path::new("segmentation.toml"))?;
//! let segmenter = Segmenter::from_config(config)?;
//!
//! let stats = segmenter.run_file(
//!     &MetaImageCodec::new(),
//!     Path::new("ct.mha"),
//!     Path::new("labels.mha"),
//! )?;
//! println!("{stats}");
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod domain;
pub mod inferer;
pub mod io;
pub mod pipeline;
pub mod processors;
pub mod utils;

/// Initializes a `tracing` subscriber reading the `RUST_LOG` environment
/// variable, defaulting to `info`. Intended for binaries and examples;
/// embedding applications that install their own subscriber should skip it.
pub fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

/// Prelude module for convenient imports.
///
/// Bring the essentials into scope with a single use statement:
///
/// ```rust
/// use voxseg::prelude::*;
/// ```
///
/// Included items cover the common path: configuration
/// (`SegmentationConfig`), the orchestrator (`Segmenter`, `RunStats`), the
/// MetaImage codec, the volume types, and the error type. For lower-level
/// pieces (individual processors, the tiling planner, the blend
/// accumulator), import directly from the respective modules.
pub mod prelude {
    pub use crate::core::config::{BlendMode, IntensityRange, ModelConfig, SegmentationConfig};
    pub use crate::core::errors::SegError;
    pub use crate::core::traits::{VolumeCodec, VoxelClassifier};
    pub use crate::domain::volume::{LabelVolume, Volume};
    pub use crate::io::MetaImageCodec;
    pub use crate::pipeline::{RunStats, Segmenter};
}
