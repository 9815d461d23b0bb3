//! Tile metadata shared by every operator.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::{Resolution, Scale, SpatialExtent, TileGrid};
use crate::raster::PixelType;
use crate::time::TemporalExtent;

/// Which axis of the (tile x time) grid varies fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    /// All times of tile 0, then all times of tile 1, ...
    #[serde(alias = "spatial")]
    TileMajor,
    /// All tiles of raster 0, then all tiles of raster 1, ...
    #[serde(alias = "temporal")]
    TimeMajor,
}

impl Order {
    pub fn opposite(self) -> Order {
        match self {
            Order::TileMajor => Order::TimeMajor,
            Order::TimeMajor => Order::TileMajor,
        }
    }
}

impl std::fmt::Display for Order {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Order::TileMajor => f.write_str("tile_major"),
            Order::TimeMajor => f.write_str("time_major"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileDescriptorInfo {
    pub temporal: TemporalExtent,
    pub raster_extent: SpatialExtent,
    pub raster_resolution: Resolution,
    pub order: Order,

    pub tile_index: usize,
    pub tile_count_total: usize,
    pub tile_counts: TileGrid,

    /// Full tile footprint; edge tiles reach past `raster_extent`.
    pub tile_extent: SpatialExtent,
    pub tile_resolution: Resolution,

    pub nodata: f64,
    pub pixel_type: PixelType,

    /// Known to be entirely nodata without evaluating the payload.
    pub only_nodata: bool,
}

impl TileDescriptorInfo {
    pub fn scale(&self) -> Scale {
        Scale::new(
            self.raster_extent.width() / self.raster_resolution.x as f64,
            self.raster_extent.height() / self.raster_resolution.y as f64,
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.tile_index >= self.tile_count_total {
            return Err(Error::Consistency(format!(
                "tile index {} not below tile count {}",
                self.tile_index, self.tile_count_total
            )));
        }
        if self.tile_count_total != self.tile_counts.total() {
            return Err(Error::Consistency(format!(
                "tile count {} does not match a {}x{} grid",
                self.tile_count_total, self.tile_counts.x, self.tile_counts.y
            )));
        }
        if self.temporal.t1 > self.temporal.t2 {
            return Err(Error::Consistency(format!(
                "temporal extent [{}, {}) is inverted",
                self.temporal.t1, self.temporal.t2
            )));
        }
        Ok(())
    }

    /// Same raster interval.
    pub fn same_raster(&self, other: &TileDescriptorInfo) -> bool {
        self.temporal == other.temporal
    }

    /// Same (time, tile) cell of the traversal grid.
    pub fn same_position(&self, other: &TileDescriptorInfo) -> bool {
        self.temporal == other.temporal && self.tile_index == other.tile_index
    }

    pub fn with_temporal(mut self, temporal: TemporalExtent) -> Self {
        self.temporal = temporal;
        self
    }

    pub fn with_pixel_type(mut self, pixel_type: PixelType) -> Self {
        self.pixel_type = pixel_type;
        self
    }
}
