//! World coordinates, pixel positions and tile indices.
//!
//! Pixel `(0, 0)` of a raster sits at the extent's `(x1, y1)` corner and pixel
//! coordinates grow towards `(x2, y2)`. Scales may be negative (north-up
//! rasters have `y1 > y2`). All helpers here are pure functions.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tolerance used when snapping world coordinates onto the pixel grid.
const SNAP_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialExtent {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl SpatialExtent {
    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// World position of pixel `(0, 0)`.
    pub fn origin(&self) -> Coord {
        Coord::new(self.x1, self.y1)
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// Area-overlap test, independent of axis direction.
    pub fn intersects(&self, other: &SpatialExtent) -> bool {
        let (ax1, ax2) = ordered(self.x1, self.x2);
        let (ay1, ay2) = ordered(self.y1, self.y2);
        let (bx1, bx2) = ordered(other.x1, other.x2);
        let (by1, by2) = ordered(other.y1, other.y2);
        ax1 < bx2 && bx1 < ax2 && ay1 < by2 && by1 < ay2
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Pixel dimensions of a raster or a tile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub x: usize,
    pub y: usize,
}

impl Resolution {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.x * self.y
    }

    pub fn is_empty(&self) -> bool {
        self.x == 0 || self.y == 0
    }
}

/// World units per pixel along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    pub x: f64,
    pub y: f64,
}

impl Scale {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Relative comparison; used to reject queries that would need resampling.
    pub fn approx_eq(&self, other: &Scale) -> bool {
        fn close(a: f64, b: f64) -> bool {
            (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
        }
        close(self.x, other.x) && close(self.y, other.y)
    }
}

/// Signed pixel position; negative values lie before the raster origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelPos {
    pub x: i64,
    pub y: i64,
}

impl PixelPos {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// Column/row of a tile inside the tile grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TilePos {
    pub x: usize,
    pub y: usize,
}

/// Tile counts per dimension. Tiles are numbered row-major.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileGrid {
    pub x: usize,
    pub y: usize,
}

impl TileGrid {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    pub fn total(&self) -> usize {
        self.x * self.y
    }

    pub fn position(&self, tile_index: usize) -> Result<TilePos> {
        if tile_index >= self.total() {
            return Err(Error::Geometry(format!(
                "tile index {tile_index} outside a {}x{} tile grid",
                self.x, self.y
            )));
        }
        Ok(TilePos {
            x: tile_index % self.x,
            y: tile_index / self.x,
        })
    }

    pub fn index(&self, pos: TilePos) -> Result<usize> {
        if pos.x >= self.x || pos.y >= self.y {
            return Err(Error::Geometry(format!(
                "tile position ({}, {}) outside a {}x{} tile grid",
                pos.x, pos.y, self.x, self.y
            )));
        }
        Ok(pos.y * self.x + pos.x)
    }

    /// Index of the tile at offset `(dx, dy)` from `tile_index`, or `None` when
    /// that neighbor falls outside the grid.
    pub fn neighbor(&self, tile_index: usize, dx: i64, dy: i64) -> Option<usize> {
        let pos = self.position(tile_index).ok()?;
        let nx = pos.x as i64 + dx;
        let ny = pos.y as i64 + dy;
        if nx < 0 || ny < 0 || nx >= self.x as i64 || ny >= self.y as i64 {
            return None;
        }
        Some(ny as usize * self.x + nx as usize)
    }
}

pub fn scale_of(extent: &SpatialExtent, resolution: Resolution) -> Result<Scale> {
    if resolution.is_empty() {
        return Err(Error::Geometry(format!(
            "resolution {}x{} has no pixels",
            resolution.x, resolution.y
        )));
    }
    Ok(Scale::new(
        extent.width() / resolution.x as f64,
        extent.height() / resolution.y as f64,
    ))
}

/// Pixel containing `coord`, snapped so that grid-aligned coordinates map to
/// exact pixel boundaries despite floating point noise.
pub fn world_to_pixel(coord: Coord, origin: Coord, scale: Scale) -> PixelPos {
    let fx = (coord.x - origin.x) / scale.x;
    let fy = (coord.y - origin.y) / scale.y;
    PixelPos::new((fx + SNAP_EPS).floor() as i64, (fy + SNAP_EPS).floor() as i64)
}

/// World position of the `(x1, y1)` corner of a pixel.
pub fn pixel_to_world(pos: PixelPos, origin: Coord, scale: Scale) -> Coord {
    Coord::new(
        origin.x + pos.x as f64 * scale.x,
        origin.y + pos.y as f64 * scale.y,
    )
}

/// Tile grid covering `resolution` pixels; edge tiles may be partial.
pub fn tile_grid(resolution: Resolution, tile_resolution: Resolution) -> Result<TileGrid> {
    if tile_resolution.is_empty() {
        return Err(Error::Geometry(format!(
            "tile resolution {}x{} has no pixels",
            tile_resolution.x, tile_resolution.y
        )));
    }
    if resolution.is_empty() {
        return Err(Error::Geometry(format!(
            "raster resolution {}x{} has no pixels",
            resolution.x, resolution.y
        )));
    }
    Ok(TileGrid::new(
        resolution.x.div_ceil(tile_resolution.x),
        resolution.y.div_ceil(tile_resolution.y),
    ))
}

/// Tile index containing a raster-local pixel.
pub fn pixel_to_tile(pos: PixelPos, tile_resolution: Resolution, grid: TileGrid) -> Result<usize> {
    if pos.x < 0 || pos.y < 0 || tile_resolution.is_empty() {
        return Err(Error::Geometry(format!(
            "pixel ({}, {}) lies before the raster origin",
            pos.x, pos.y
        )));
    }
    let tile = TilePos {
        x: pos.x as usize / tile_resolution.x,
        y: pos.y as usize / tile_resolution.y,
    };
    grid.index(tile)
}

/// World extent of a full tile; edge tiles extend past the raster extent.
pub fn tile_extent(
    origin: Coord,
    scale: Scale,
    pos: TilePos,
    tile_resolution: Resolution,
) -> SpatialExtent {
    let start = PixelPos::new(
        (pos.x * tile_resolution.x) as i64,
        (pos.y * tile_resolution.y) as i64,
    );
    let end = PixelPos::new(
        start.x + tile_resolution.x as i64,
        start.y + tile_resolution.y as i64,
    );
    let a = pixel_to_world(start, origin, scale);
    let b = pixel_to_world(end, origin, scale);
    SpatialExtent::new(a.x, a.y, b.x, b.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_grid_rounds_up_partial_tiles() {
        let grid = tile_grid(Resolution::new(10, 7), Resolution::new(4, 4)).unwrap();
        assert_eq!(grid, TileGrid::new(3, 2));
        assert_eq!(grid.total(), 6);
    }

    #[test]
    fn neighbors_outside_the_grid_are_absent() {
        let grid = TileGrid::new(3, 3);
        assert_eq!(grid.neighbor(4, 1, -1), Some(2));
        assert_eq!(grid.neighbor(4, -1, 1), Some(6));
        assert_eq!(grid.neighbor(0, -1, 0), None);
        assert_eq!(grid.neighbor(0, 0, -1), None);
        assert_eq!(grid.neighbor(8, 1, 1), None);
    }

    #[test]
    fn world_pixel_round_trip_with_negative_scale() {
        let origin = Coord::new(100.0, 50.0);
        let scale = Scale::new(0.5, -0.5);
        let p = world_to_pixel(Coord::new(101.25, 48.75), origin, scale);
        assert_eq!(p, PixelPos::new(2, 2));
        assert_eq!(pixel_to_world(p, origin, scale), Coord::new(101.0, 49.0));
    }

    #[test]
    fn pixel_before_origin_is_negative() {
        let p = world_to_pixel(Coord::new(-2.0, 0.0), Coord::new(0.0, 0.0), Scale::new(1.0, 1.0));
        assert_eq!(p, PixelPos::new(-2, 0));
        let grid = TileGrid::new(2, 2);
        assert!(pixel_to_tile(p, Resolution::new(4, 4), grid).is_err());
        assert_eq!(
            pixel_to_tile(PixelPos::new(5, 1), Resolution::new(4, 4), grid).unwrap(),
            1
        );
    }

    #[test]
    fn position_rejects_out_of_range_index() {
        let grid = TileGrid::new(2, 2);
        assert_eq!(grid.position(3).unwrap(), TilePos { x: 1, y: 1 });
        assert!(matches!(grid.position(4), Err(Error::Geometry(_))));
    }
}
