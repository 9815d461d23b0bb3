//! Source leaf: steps a backend's time series across the query's tile grid.
//!
//! Cursor = (time, tile). The minor axis is the tile in time-major order and
//! the time step in tile-major order. `primed` marks a cursor that already
//! points at the next descriptor (after `initialize` or a skip).

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, trace};

use rasq_core::dag::OperatorKind;
use rasq_core::error::{Error, Result};
use rasq_core::geometry::{tile_extent, world_to_pixel, PixelPos, TileGrid};
use rasq_core::query::QueryRectangle;
use rasq_core::tile::{Order, TileDescriptorInfo};
use rasq_core::time::{TemporalExtent, Timestamp};

use crate::backend::{Backend, TileRequest};
use crate::descriptor::{Payload, TileDescriptor};
use crate::traits::{BoxedOperator, Lifecycle, OpState, Operator, Pull};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceParams {
    pub dataset: String,
}

pub struct SourceOp {
    query: QueryRectangle,
    backend: Arc<dyn Backend>,
    life: Lifecycle,

    grid: TileGrid,
    /// Dataset pixel under query pixel `(0, 0)`.
    offset: PixelPos,
    series_start: Timestamp,
    end: Timestamp,

    time: Timestamp,
    tile: usize,
    primed: bool,
}

impl SourceOp {
    pub fn new(query: QueryRectangle, backend: Arc<dyn Backend>) -> Self {
        Self {
            query,
            backend,
            life: Lifecycle::new(OperatorKind::Source.name()),
            grid: TileGrid::default(),
            offset: PixelPos::default(),
            series_start: 0,
            end: 0,
            time: 0,
            tile: 0,
            primed: false,
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    fn step_time(&self, t: Timestamp) -> Result<Timestamp> {
        let next = self.backend.advance(t)?;
        if next <= t {
            return Err(Error::Backend(format!(
                "dataset '{}' does not advance past {t}",
                self.backend.name()
            )));
        }
        Ok(next)
    }

    fn at_end(&self) -> bool {
        self.time >= self.end || self.tile >= self.grid.total()
    }

    /// One step along the minor axis.
    fn advance_minor(&mut self) -> Result<()> {
        match self.query.order {
            Order::TimeMajor => {
                self.tile += 1;
                if self.tile >= self.grid.total() {
                    self.tile = 0;
                    self.time = self.step_time(self.time)?;
                }
            }
            Order::TileMajor => {
                self.time = self.step_time(self.time)?;
                if self.time >= self.end {
                    self.tile += 1;
                    self.time = self.series_start;
                }
            }
        }
        Ok(())
    }

    fn descriptor_at(&self, time: Timestamp, tile: usize) -> Result<TileDescriptor> {
        let meta = self.backend.metadata();
        let pos = self.grid.position(tile)?;
        let (start, fill) = self.query.tile_window(tile)?;
        let scale = self.query.scale()?;
        let info = TileDescriptorInfo {
            temporal: TemporalExtent::new(time, self.backend.validity_end(time)?)?,
            raster_extent: self.query.spatial,
            raster_resolution: self.query.resolution,
            order: self.query.order,
            tile_index: tile,
            tile_count_total: self.grid.total(),
            tile_counts: self.grid,
            tile_extent: tile_extent(
                self.query.spatial.origin(),
                scale,
                pos,
                self.query.tile_resolution,
            ),
            tile_resolution: self.query.tile_resolution,
            nodata: meta.nodata,
            pixel_type: meta.pixel_type,
            only_nodata: false,
        };

        let offset = PixelPos::new(self.offset.x + start.x, self.offset.y + start.y);
        let outside = offset.x >= meta.resolution.x as i64
            || offset.y >= meta.resolution.y as i64
            || offset.x + fill.x as i64 <= 0
            || offset.y + fill.y as i64 <= 0;
        if outside {
            return Ok(TileDescriptor::nodata(info));
        }

        let request = TileRequest {
            time,
            offset,
            fill,
            tile_resolution: self.query.tile_resolution,
            pixel_type: meta.pixel_type,
            nodata: meta.nodata,
            order: self.query.order,
        };
        Ok(TileDescriptor::new(
            info,
            Payload::Read {
                backend: Arc::clone(&self.backend),
                request,
            },
        ))
    }
}

impl Operator for SourceOp {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Source
    }

    fn query(&self) -> &QueryRectangle {
        &self.query
    }

    fn state(&self) -> OpState {
        self.life.state()
    }

    fn initialize(&mut self) -> Result<()> {
        self.life.initialize()?;
        self.query.validate()?;
        let meta = self.backend.metadata().clone();
        let scale = self.query.scale()?;
        if !scale.approx_eq(&meta.scale) {
            return Err(Error::Config(format!(
                "query scale ({}, {}) differs from dataset '{}' scale ({}, {}); resampling is not supported",
                scale.x,
                scale.y,
                self.backend.name(),
                meta.scale.x,
                meta.scale.y
            )));
        }
        self.grid = self.query.tile_grid()?;
        self.offset = world_to_pixel(self.query.spatial.origin(), meta.origin, meta.scale);

        let mut t = meta.temporal.t1;
        while t < meta.temporal.t2 && self.backend.validity_end(t)? <= self.query.temporal.t1 {
            t = self.step_time(t)?;
        }
        self.series_start = t;
        self.end = self.query.temporal.t2.min(meta.temporal.t2);
        self.time = t;
        self.tile = 0;
        self.primed = true;
        debug!(
            dataset = self.backend.name(),
            order = %self.query.order,
            tiles = self.grid.total(),
            series_start = self.series_start,
            end = self.end,
            "source initialized"
        );
        Ok(())
    }

    fn next_descriptor(&mut self) -> Result<Pull> {
        self.life.check("next_descriptor")?;
        if self.life.is_exhausted() {
            return Ok(Pull::End);
        }
        if !self.primed {
            self.advance_minor()?;
        }
        self.primed = false;
        if self.at_end() {
            self.life.exhaust();
            return Ok(Pull::End);
        }
        self.life.iterating();
        trace!(time = self.time, tile = self.tile, "source tile");
        Ok(Pull::Tile(self.descriptor_at(self.time, self.tile)?))
    }

    fn get_descriptor(&mut self, tile_index: usize) -> Result<Option<TileDescriptor>> {
        self.life.check("get_descriptor")?;
        self.grid.position(tile_index)?;
        if self.life.is_exhausted() || self.at_end() {
            return Ok(None);
        }
        self.descriptor_at(self.time, tile_index).map(Some)
    }

    fn skip_current_raster(&mut self, count: usize) -> Result<()> {
        self.life.check("skip_current_raster")?;
        if self.life.is_exhausted() || count == 0 {
            return Ok(());
        }
        match self.query.order {
            Order::TimeMajor => {
                for _ in 0..count {
                    if self.time >= self.end {
                        break;
                    }
                    self.time = self.step_time(self.time)?;
                }
                self.tile = 0;
            }
            Order::TileMajor => {
                for _ in 0..count {
                    if self.at_end() {
                        break;
                    }
                    self.advance_minor()?;
                }
            }
        }
        self.primed = true;
        Ok(())
    }

    fn skip_current_tile(&mut self, count: usize) -> Result<()> {
        self.life.check("skip_current_tile")?;
        if self.life.is_exhausted() || count == 0 {
            return Ok(());
        }
        match self.query.order {
            Order::TileMajor => {
                self.tile = self.tile.saturating_add(count);
                self.time = self.series_start;
            }
            Order::TimeMajor => {
                for _ in 0..count {
                    if self.at_end() {
                        break;
                    }
                    self.advance_minor()?;
                }
            }
        }
        self.primed = true;
        Ok(())
    }

    fn rebuild(&self, query: &QueryRectangle) -> Result<BoxedOperator> {
        Ok(Box::new(SourceOp::new(*query, Arc::clone(&self.backend))))
    }
}
