//! Volume processing steps.
//!
//! Each processor is one named, parameterized operation on a volume.
//! Geometry-affecting processors return a record of the parameters they
//! used so the inverse pass can undo them exactly; see
//! [`crate::pipeline::transforms`] for the composed pipeline.

pub mod crop;
pub mod intensity;
pub mod orientation;
pub mod pad;
pub mod spacing;

pub use crop::{CropForeground, CropRecord};
pub use intensity::ScaleIntensityRange;
pub use orientation::{OrientRecord, OrientToCanonical};
pub use pad::{PadRecord, crop_back, pad_to_min};
pub use spacing::{ResampleRecord, ResampleToSpacing, resize_nearest, resize_trilinear};
