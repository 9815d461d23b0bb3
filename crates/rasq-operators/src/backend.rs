//! The storage seam under source operators.
//!
//! A backend knows a dataset's time series and pixel grid and fills one tile
//! window on request. Concrete backends live in `rasq-io`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use rasq_core::error::Result;
use rasq_core::geometry::{Coord, PixelPos, Resolution, Scale, SpatialExtent};
use rasq_core::raster::{PixelType, RasterBuffer};
use rasq_core::tile::Order;
use rasq_core::time::{TemporalExtent, Timestamp};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// First time step start to series end.
    pub temporal: TemporalExtent,
    /// World position of dataset pixel `(0, 0)`.
    pub origin: Coord,
    pub scale: Scale,
    pub resolution: Resolution,
    pub pixel_type: PixelType,
    pub nodata: f64,
}

impl DatasetMetadata {
    pub fn extent(&self) -> SpatialExtent {
        SpatialExtent::new(
            self.origin.x,
            self.origin.y,
            self.origin.x + self.scale.x * self.resolution.x as f64,
            self.origin.y + self.scale.y * self.resolution.y as f64,
        )
    }
}

/// One tile window to fill, in dataset pixel space.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRequest {
    /// Start of the time step to read.
    pub time: Timestamp,
    /// Dataset pixel under tile cell `(0, 0)`; may be negative.
    pub offset: PixelPos,
    /// Cells of the tile that lie inside the query raster.
    pub fill: Resolution,
    pub tile_resolution: Resolution,
    pub pixel_type: PixelType,
    pub nodata: f64,
    pub order: Order,
}

impl TileRequest {
    /// Build a nodata tile and fill every in-window cell from `cell`, which is
    /// called with dataset pixel coordinates and returns `None` for pixels the
    /// dataset does not cover.
    pub fn render<F>(&self, mut cell: F) -> Result<RasterBuffer>
    where
        F: FnMut(usize, usize) -> Result<Option<f64>>,
    {
        let mut out = RasterBuffer::filled(self.pixel_type, self.tile_resolution, self.nodata);
        for y in 0..self.fill.y {
            let dy = self.offset.y + y as i64;
            if dy < 0 {
                continue;
            }
            for x in 0..self.fill.x {
                let dx = self.offset.x + x as i64;
                if dx < 0 {
                    continue;
                }
                if let Some(v) = cell(dx as usize, dy as usize)? {
                    out.set(x, y, v);
                }
            }
        }
        Ok(out)
    }
}

pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    fn metadata(&self) -> &DatasetMetadata;

    /// Start of the time step after the one starting at `t`.
    fn advance(&self, t: Timestamp) -> Result<Timestamp>;

    /// End of the validity window of the time step starting at `t`.
    fn validity_end(&self, t: Timestamp) -> Result<Timestamp>;

    fn fill(&self, request: &TileRequest) -> Result<RasterBuffer>;
}

/// Resolves dataset names for source operators.
pub trait BackendProvider {
    fn backend(&self, dataset: &str) -> Result<Arc<dyn Backend>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_leaves_cells_outside_the_window_as_nodata() {
        let req = TileRequest {
            time: 0,
            offset: PixelPos::new(-1, 0),
            fill: Resolution::new(3, 1),
            tile_resolution: Resolution::new(4, 2),
            pixel_type: PixelType::I16,
            nodata: -1.0,
            order: Order::TimeMajor,
        };
        let r = req
            .render(|x, y| Ok(if x < 1 { Some((10 * y + x + 5) as f64) } else { None }))
            .unwrap();
        assert_eq!(
            r.to_f64_vec(),
            vec![-1.0, 5.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0]
        );
    }
}
