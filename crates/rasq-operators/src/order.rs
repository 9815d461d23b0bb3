//! Order conversion between tile-major and time-major streams.
//!
//! The input subtree always runs in the opposite order. Time-major output
//! walks a tile-major input with random access (tile 0 by pull, the rest by
//! `get_descriptor`, then a raster skip). Tile-major output materializes the
//! whole time-major input as shared tiles and serves the transpose.

use serde::Deserialize;
use tracing::debug;

use rasq_core::dag::OperatorKind;
use rasq_core::error::{Error, Result};
use rasq_core::query::QueryRectangle;
use rasq_core::tile::Order;

use crate::cache::SharedTile;
use crate::descriptor::TileDescriptor;
use crate::traits::{BoxedOperator, Cursor, Lifecycle, OpState, Operator, Pull, SkipUnit};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderChangerParams {
    /// Cap on descriptors held when materializing; filled from the engine
    /// config when absent.
    #[serde(default)]
    pub max_materialized_tiles: Option<usize>,
}

/// Walk state for time-major output.
#[derive(Debug, Default)]
struct Walk {
    tiles: usize,
    next_tile: usize,
    /// Skip the input's current raster before the next pull.
    skip_pending: bool,
}

/// Transposed table for tile-major output.
#[derive(Default)]
struct Table {
    entries: Vec<SharedTile>,
    tiles_per_raster: usize,
    rasters: usize,
    tile: usize,
    raster: usize,
    /// Raster of the most recently produced descriptor.
    active_raster: Option<usize>,
}

pub struct OrderChangerOp {
    query: QueryRectangle,
    params: OrderChangerParams,
    input: BoxedOperator,
    life: Lifecycle,
    cursor: Cursor,
    walk: Walk,
    table: Table,
}

impl OrderChangerOp {
    pub fn new(query: QueryRectangle, params: OrderChangerParams, input: BoxedOperator) -> Self {
        Self {
            query,
            params,
            input,
            life: Lifecycle::new(OperatorKind::OrderChanger.name()),
            cursor: Cursor::default(),
            walk: Walk::default(),
            table: Table::default(),
        }
    }

    fn materialize(&mut self) -> Result<()> {
        let limit = self.params.max_materialized_tiles.unwrap_or(usize::MAX);
        let mut entries = Vec::new();
        while let Pull::Tile(d) = self.input.next_descriptor()? {
            if entries.len() >= limit {
                return Err(Error::Config(format!(
                    "order_changer would materialize more than {limit} tiles"
                )));
            }
            entries.push(SharedTile::new(d));
        }
        let tiles_per_raster = entries.first().map(|s| s.info().tile_count_total).unwrap_or(0);
        if tiles_per_raster > 0 && entries.len() % tiles_per_raster != 0 {
            return Err(Error::Consistency(format!(
                "{} materialized tiles are not a multiple of {tiles_per_raster} tiles per raster",
                entries.len()
            )));
        }
        let rasters = if tiles_per_raster == 0 {
            0
        } else {
            entries.len() / tiles_per_raster
        };
        debug!(tiles = entries.len(), rasters, tiles_per_raster, "order changer materialized input");
        self.table = Table {
            entries,
            tiles_per_raster,
            rasters,
            ..Table::default()
        };
        Ok(())
    }

    fn produce(&mut self) -> Result<Pull> {
        match self.query.order {
            Order::TimeMajor => self.produce_time_major(),
            Order::TileMajor => self.produce_tile_major(),
        }
    }

    fn produce_time_major(&mut self) -> Result<Pull> {
        let order = self.query.order;
        if self.walk.next_tile == 0 {
            if self.walk.skip_pending {
                self.walk.skip_pending = false;
                self.input.skip_current_raster(1)?;
            }
            let d = match self.input.next_descriptor()? {
                Pull::Tile(d) if d.info().tile_index == 0 => d,
                _ => return Ok(Pull::End),
            };
            self.walk.tiles = d.info().tile_count_total;
            self.walk.next_tile = 1;
            if self.walk.next_tile >= self.walk.tiles {
                self.walk.next_tile = 0;
                self.walk.skip_pending = true;
            }
            return Ok(Pull::Tile(d.with_order(order)));
        }
        let k = self.walk.next_tile;
        let d = self.input.get_descriptor(k)?.ok_or_else(|| {
            Error::Consistency(format!("order_changer input has no tile {k} for the active raster"))
        })?;
        self.walk.next_tile += 1;
        if self.walk.next_tile >= self.walk.tiles {
            self.walk.next_tile = 0;
            self.walk.skip_pending = true;
        }
        Ok(Pull::Tile(d.with_order(order)))
    }

    fn produce_tile_major(&mut self) -> Result<Pull> {
        let t = &mut self.table;
        if t.tile >= t.tiles_per_raster || t.rasters == 0 {
            return Ok(Pull::End);
        }
        let shared = &t.entries[t.tile + t.raster * t.tiles_per_raster];
        let d = shared.descriptor().with_order(Order::TileMajor);
        t.active_raster = Some(t.raster);
        t.raster += 1;
        if t.raster == t.rasters {
            t.raster = 0;
            t.tile += 1;
        }
        Ok(Pull::Tile(d))
    }

    fn skip(&mut self, unit: SkipUnit, count: usize) -> Result<()> {
        let mut cursor = std::mem::take(&mut self.cursor);
        let order = self.query.order;
        let res = cursor.skip(unit, order, count, || self.produce());
        self.cursor = cursor;
        if !res? {
            self.life.exhaust();
        }
        Ok(())
    }
}

impl Operator for OrderChangerOp {
    fn kind(&self) -> OperatorKind {
        OperatorKind::OrderChanger
    }

    fn query(&self) -> &QueryRectangle {
        &self.query
    }

    fn state(&self) -> OpState {
        self.life.state()
    }

    fn children(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn initialize(&mut self) -> Result<()> {
        self.life.initialize()?;
        if self.input.query().order != self.query.order.opposite() {
            return Err(Error::Config(format!(
                "order_changer to {} needs a {} input",
                self.query.order,
                self.query.order.opposite()
            )));
        }
        self.input.initialize()?;
        if self.query.order == Order::TileMajor {
            self.materialize()?;
        }
        debug!(target_order = %self.query.order, "order changer initialized");
        Ok(())
    }

    fn next_descriptor(&mut self) -> Result<Pull> {
        self.life.check("next_descriptor")?;
        if self.life.is_exhausted() {
            return Ok(Pull::End);
        }
        let pulled = match self.cursor.take_held() {
            Some(d) => Pull::Tile(d),
            None => self.produce()?,
        };
        match pulled {
            Pull::Tile(d) => {
                self.cursor.emitted(*d.info());
                self.life.iterating();
                Ok(Pull::Tile(d))
            }
            Pull::End => {
                self.life.exhaust();
                self.table.entries.clear();
                Ok(Pull::End)
            }
        }
    }

    fn get_descriptor(&mut self, tile_index: usize) -> Result<Option<TileDescriptor>> {
        self.life.check("get_descriptor")?;
        if self.life.is_exhausted() {
            return Ok(None);
        }
        match self.query.order {
            Order::TimeMajor => Ok(self
                .input
                .get_descriptor(tile_index)?
                .map(|d| d.with_order(Order::TimeMajor))),
            Order::TileMajor => {
                let t = &self.table;
                if t.rasters == 0 {
                    return Ok(None);
                }
                if tile_index >= t.tiles_per_raster {
                    return Err(Error::Geometry(format!(
                        "tile index {tile_index} outside a raster of {} tiles",
                        t.tiles_per_raster
                    )));
                }
                let raster = t.active_raster.unwrap_or(0);
                let shared = &t.entries[tile_index + raster * t.tiles_per_raster];
                Ok(Some(shared.descriptor().with_order(Order::TileMajor)))
            }
        }
    }

    fn skip_current_raster(&mut self, count: usize) -> Result<()> {
        self.life.check("skip_current_raster")?;
        if self.life.is_exhausted() {
            return Ok(());
        }
        self.skip(SkipUnit::Raster, count)
    }

    fn skip_current_tile(&mut self, count: usize) -> Result<()> {
        self.life.check("skip_current_tile")?;
        if self.life.is_exhausted() {
            return Ok(());
        }
        self.skip(SkipUnit::Tile, count)
    }

    fn rebuild(&self, query: &QueryRectangle) -> Result<BoxedOperator> {
        let input = self.input.rebuild(&query.with_order(query.order.opposite()))?;
        Ok(Box::new(Self::new(*query, self.params.clone(), input)))
    }
}
