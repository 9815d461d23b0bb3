//! Pixel grid shared by every concrete backend.

use serde::{Deserialize, Serialize};

use rasq_core::error::{Error, Result};
use rasq_core::geometry::{Coord, Resolution, Scale};
use rasq_core::raster::PixelType;
use rasq_core::time::TemporalExtent;
use rasq_operators::backend::DatasetMetadata;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetGrid {
    pub origin: Coord,
    pub scale: Scale,
    pub resolution: Resolution,
    pub pixel_type: PixelType,
    #[serde(default)]
    pub nodata: f64,
}

impl DatasetGrid {
    pub fn validate(&self) -> Result<()> {
        if self.resolution.is_empty() {
            return Err(Error::Config("dataset resolution must be non-empty".into()));
        }
        if self.scale.x == 0.0 || self.scale.y == 0.0 || !self.scale.x.is_finite() || !self.scale.y.is_finite() {
            return Err(Error::Config(format!(
                "dataset scale ({}, {}) must be finite and non-zero",
                self.scale.x, self.scale.y
            )));
        }
        Ok(())
    }

    pub fn metadata(&self, temporal: TemporalExtent) -> DatasetMetadata {
        DatasetMetadata {
            temporal,
            origin: self.origin,
            scale: self.scale,
            resolution: self.resolution,
            pixel_type: self.pixel_type,
            nodata: self.nodata,
        }
    }

    /// Row-major index of dataset pixel `(x, y)`, `None` outside the grid.
    pub fn index(&self, x: usize, y: usize) -> Option<usize> {
        (x < self.resolution.x && y < self.resolution.y).then(|| y * self.resolution.x + x)
    }
}
