#![forbid(unsafe_code)]
//! rasq-core: the shared vocabulary of the tile engine.
//!
//! Geometry and time helpers, pixel types and raster buffers, tile metadata,
//! the query rectangle, the operator vocabulary, errors, config, hashing and
//! run manifests. No I/O and no operator logic lives here.

pub mod config;
pub mod dag;
pub mod error;
pub mod geometry;
pub mod hash;
pub mod id;
pub mod manifest;
pub mod prelude;
pub mod query;
pub mod raster;
pub mod tile;
pub mod time;

pub use error::{Error, Result};

/// Engine version recorded in run manifests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
