//! The query rectangle: the space/time window, output grid and traversal order.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::{
    pixel_to_world, scale_of, tile_extent, tile_grid, PixelPos, Resolution, Scale, SpatialExtent,
    TileGrid,
};
use crate::tile::{Order, TileDescriptorInfo};
use crate::time::TemporalExtent;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryRectangle {
    pub temporal: TemporalExtent,
    pub spatial: SpatialExtent,
    pub resolution: Resolution,
    pub tile_resolution: Resolution,
    pub order: Order,
}

impl QueryRectangle {
    pub fn validate(&self) -> Result<()> {
        if self.temporal.t1 >= self.temporal.t2 {
            return Err(Error::Config(format!(
                "query time window [{}, {}) is empty",
                self.temporal.t1, self.temporal.t2
            )));
        }
        if self.resolution.is_empty() || self.tile_resolution.is_empty() {
            return Err(Error::Config(format!(
                "query resolution {}x{} / tile resolution {}x{} must be positive",
                self.resolution.x, self.resolution.y, self.tile_resolution.x, self.tile_resolution.y
            )));
        }
        if self.spatial.width() == 0.0 || self.spatial.height() == 0.0 {
            return Err(Error::Config("query spatial extent is degenerate".into()));
        }
        Ok(())
    }

    pub fn scale(&self) -> Result<Scale> {
        scale_of(&self.spatial, self.resolution)
    }

    pub fn tile_grid(&self) -> Result<TileGrid> {
        tile_grid(self.resolution, self.tile_resolution)
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn with_temporal(mut self, temporal: TemporalExtent) -> Self {
        self.temporal = temporal;
        self
    }

    /// First query pixel of a tile and the number of its cells that fall
    /// inside the query raster.
    pub fn tile_window(&self, tile_index: usize) -> Result<(PixelPos, Resolution)> {
        let pos = self.tile_grid()?.position(tile_index)?;
        let start_x = pos.x * self.tile_resolution.x;
        let start_y = pos.y * self.tile_resolution.y;
        let fill = Resolution::new(
            self.tile_resolution.x.min(self.resolution.x - start_x),
            self.tile_resolution.y.min(self.resolution.y - start_y),
        );
        Ok((PixelPos::new(start_x as i64, start_y as i64), fill))
    }

    /// A rectangle covering only the in-raster part of one tile. Its tile
    /// grid is 1x1, so replays over it yield that tile alone as tile 0.
    pub fn tile_footprint(&self, tile_index: usize) -> Result<QueryRectangle> {
        let (start, fill) = self.tile_window(tile_index)?;
        let scale = self.scale()?;
        let origin = self.spatial.origin();
        let a = pixel_to_world(start, origin, scale);
        let b = pixel_to_world(
            PixelPos::new(start.x + fill.x as i64, start.y + fill.y as i64),
            origin,
            scale,
        );
        Ok(QueryRectangle {
            spatial: SpatialExtent::new(a.x, a.y, b.x, b.y),
            resolution: fill,
            ..*self
        })
    }

    /// Re-express a descriptor produced under a footprint rectangle as tile
    /// `tile_index` of this rectangle.
    pub fn relabel(&self, info: TileDescriptorInfo, tile_index: usize) -> Result<TileDescriptorInfo> {
        let grid = self.tile_grid()?;
        let pos = grid.position(tile_index)?;
        let scale = self.scale()?;
        Ok(TileDescriptorInfo {
            raster_extent: self.spatial,
            raster_resolution: self.resolution,
            order: self.order,
            tile_index,
            tile_count_total: grid.total(),
            tile_counts: grid,
            tile_extent: tile_extent(self.spatial.origin(), scale, pos, self.tile_resolution),
            ..info
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> QueryRectangle {
        QueryRectangle {
            temporal: TemporalExtent { t1: 0, t2: 100 },
            spatial: SpatialExtent::new(0.0, 10.0, 10.0, 0.0),
            resolution: Resolution::new(10, 10),
            tile_resolution: Resolution::new(4, 4),
            order: Order::TileMajor,
        }
    }

    #[test]
    fn edge_tile_footprint_is_clipped_to_the_raster() {
        let q = query();
        assert_eq!(q.tile_grid().unwrap(), TileGrid::new(3, 3));
        let f = q.tile_footprint(8).unwrap();
        assert_eq!(f.resolution, Resolution::new(2, 2));
        assert_eq!(f.spatial, SpatialExtent::new(8.0, 2.0, 10.0, 0.0));
        assert_eq!(f.tile_grid().unwrap().total(), 1);
        assert_eq!(f.scale().unwrap(), q.scale().unwrap());
    }

    #[test]
    fn validate_rejects_empty_windows() {
        let mut q = query();
        assert!(q.validate().is_ok());
        q.temporal = TemporalExtent { t1: 5, t2: 5 };
        assert!(q.validate().unwrap_err().is_config());
        let mut q = query();
        q.tile_resolution = Resolution::new(0, 4);
        assert!(q.validate().is_err());
    }
}
