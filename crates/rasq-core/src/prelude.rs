//! Convenient re-exports for downstream crates.

pub use crate::config::EngineConfig;
pub use crate::dag::OperatorKind;
pub use crate::error::{Error, Result};
pub use crate::geometry::{
    Coord, PixelPos, Resolution, Scale, SpatialExtent, TileGrid, TilePos,
};
pub use crate::id::OpId;
pub use crate::manifest::{ManifestId, RunManifest};
pub use crate::query::QueryRectangle;
pub use crate::raster::{is_nodata, Pixel, PixelType, RasterBuffer};
pub use crate::tile::{Order, TileDescriptorInfo};
pub use crate::time::{TemporalExtent, TimeStep, TimeUnit, Timestamp};
