//! The composed pipeline: pre-transforms, their inverse, and the orchestrator.

pub mod orchestrator;
pub mod transforms;

pub use orchestrator::{RunStats, Segmenter};
pub use transforms::{PreTransforms, TraceStep, TransformTrace};
