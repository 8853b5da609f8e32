//! Tiled inference: window planning, blending, and the sliding-window engine.

pub mod blend;
pub mod sliding_window;
pub mod tiling;

pub use blend::{BlendAccumulator, importance_map};
pub use sliding_window::SlidingWindowInferer;
pub use tiling::{GridWindow, TilingPlan};
