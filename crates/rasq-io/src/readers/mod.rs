//! File-backed datasets.

pub mod json;

pub use json::{write_dataset, JsonRasterBackend};
