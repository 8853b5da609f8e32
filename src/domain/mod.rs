//! Domain types: volume geometry and voxel data.

pub mod geometry;
pub mod volume;

pub use geometry::{
    Affine, AxisCode, Geometry, axcodes_from_directions, axcodes_to_string, parse_axcodes,
};
pub use volume::{LabelVolume, Volume};
