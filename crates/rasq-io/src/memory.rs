//! In-memory dataset with explicit per-raster validity intervals.
//!
//! Intervals must be ordered and must not overlap; gaps and irregular
//! durations are allowed. Mostly used by tests and inline YAML datasets.

use rasq_core::error::{Error, Result};
use rasq_core::raster::RasterBuffer;
use rasq_core::time::{TemporalExtent, Timestamp};
use rasq_operators::backend::{Backend, DatasetMetadata, TileRequest};

use crate::grid::DatasetGrid;

#[derive(Debug, Clone)]
pub struct MemoryBackend {
    name: String,
    grid: DatasetGrid,
    metadata: DatasetMetadata,
    rasters: Vec<(TemporalExtent, RasterBuffer)>,
}

impl MemoryBackend {
    pub fn new(name: impl Into<String>, grid: DatasetGrid) -> Result<Self> {
        grid.validate()?;
        let metadata = grid.metadata(TemporalExtent::new(0, 0)?);
        Ok(Self {
            name: name.into(),
            grid,
            metadata,
            rasters: Vec::new(),
        })
    }

    /// Append one raster valid over `[t1, t2)`.
    pub fn push(&mut self, temporal: TemporalExtent, raster: RasterBuffer) -> Result<()> {
        if temporal.t1 >= temporal.t2 {
            return Err(Error::Config(format!(
                "raster interval [{}, {}) of '{}' is empty",
                temporal.t1, temporal.t2, self.name
            )));
        }
        if let Some((last, _)) = self.rasters.last() {
            if temporal.t1 < last.t2 {
                return Err(Error::Config(format!(
                    "raster interval [{}, {}) of '{}' overlaps or precedes [{}, {})",
                    temporal.t1, temporal.t2, self.name, last.t1, last.t2
                )));
            }
        }
        if raster.resolution() != self.grid.resolution {
            return Err(Error::Config(format!(
                "raster of '{}' is {}x{}, dataset is {}x{}",
                self.name,
                raster.resolution().x,
                raster.resolution().y,
                self.grid.resolution.x,
                self.grid.resolution.y
            )));
        }
        let raster = if raster.pixel_type() == self.grid.pixel_type {
            raster
        } else {
            raster.convert(self.grid.pixel_type)
        };
        let t1 = self.rasters.first().map(|(t, _)| t.t1).unwrap_or(temporal.t1);
        self.metadata.temporal = TemporalExtent::new(t1, temporal.t2)?;
        self.rasters.push((temporal, raster));
        Ok(())
    }

    /// Builder form of [`push`](Self::push) for `f64` values.
    pub fn with_values(mut self, temporal: TemporalExtent, values: Vec<f64>) -> Result<Self> {
        let raster = RasterBuffer::from_vec(self.grid.resolution, values)?;
        self.push(temporal, raster)?;
        Ok(self)
    }

    pub fn raster_count(&self) -> usize {
        self.rasters.len()
    }

    fn position(&self, t: Timestamp) -> Result<usize> {
        self.rasters
            .binary_search_by_key(&t, |(e, _)| e.t1)
            .map_err(|_| Error::Backend(format!("dataset '{}' has no raster starting at {t}", self.name)))
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    fn advance(&self, t: Timestamp) -> Result<Timestamp> {
        let i = self.position(t)?;
        Ok(self
            .rasters
            .get(i + 1)
            .map(|(e, _)| e.t1)
            .unwrap_or(self.metadata.temporal.t2))
    }

    fn validity_end(&self, t: Timestamp) -> Result<Timestamp> {
        let i = self.position(t)?;
        Ok(self.rasters[i].0.t2)
    }

    fn fill(&self, request: &TileRequest) -> Result<RasterBuffer> {
        let i = self.position(request.time)?;
        let raster = &self.rasters[i].1;
        request.render(|x, y| Ok(self.grid.index(x, y).map(|idx| raster.get_index(idx))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rasq_core::geometry::{Coord, PixelPos, Resolution, Scale};
    use rasq_core::raster::PixelType;
    use rasq_core::tile::Order;

    fn grid() -> DatasetGrid {
        DatasetGrid {
            origin: Coord::new(0.0, 0.0),
            scale: Scale::new(1.0, 1.0),
            resolution: Resolution::new(2, 2),
            pixel_type: PixelType::F32,
            nodata: -1.0,
        }
    }

    #[test]
    fn irregular_intervals_step_by_raster_start() {
        let b = MemoryBackend::new("m", grid())
            .unwrap()
            .with_values(TemporalExtent::new(0, 5).unwrap(), vec![1.0; 4])
            .unwrap()
            .with_values(TemporalExtent::new(7, 20).unwrap(), vec![2.0; 4])
            .unwrap();
        assert_eq!(b.metadata().temporal, TemporalExtent::new(0, 20).unwrap());
        assert_eq!(b.advance(0).unwrap(), 7);
        assert_eq!(b.validity_end(0).unwrap(), 5);
        assert_eq!(b.advance(7).unwrap(), 20);
        assert!(matches!(b.advance(3), Err(Error::Backend(_))));
    }

    #[test]
    fn overlapping_intervals_are_rejected() {
        let b = MemoryBackend::new("m", grid())
            .unwrap()
            .with_values(TemporalExtent::new(0, 10).unwrap(), vec![0.0; 4])
            .unwrap();
        let err = b
            .with_values(TemporalExtent::new(5, 15).unwrap(), vec![0.0; 4])
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn fill_reads_the_window_and_pads_with_nodata() {
        let b = MemoryBackend::new("m", grid())
            .unwrap()
            .with_values(TemporalExtent::new(0, 1).unwrap(), vec![1.0, 2.0, 3.0, 4.0])
            .unwrap();
        let req = TileRequest {
            time: 0,
            offset: PixelPos::new(1, 1),
            fill: Resolution::new(2, 2),
            tile_resolution: Resolution::new(2, 2),
            pixel_type: PixelType::F32,
            nodata: -1.0,
            order: Order::TimeMajor,
        };
        assert_eq!(b.fill(&req).unwrap().to_f64_vec(), vec![4.0, -1.0, -1.0, -1.0]);
    }
}
