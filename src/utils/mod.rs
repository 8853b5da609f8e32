//! Shared helpers.

pub mod tensor;

pub use tensor::argmax_channels;
