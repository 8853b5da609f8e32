//! Volume file codecs.

pub mod meta_image;

pub use meta_image::MetaImageCodec;
