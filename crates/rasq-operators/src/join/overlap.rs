//! Two-stream temporal overlap join.
//!
//! Both inputs run time-major over the same tile grid. Rasters are paired
//! like an interval merge join: non-overlapping rasters are skipped, and the
//! side whose raster ends later is cached while its tiles are pulled so it can
//! be replayed against the other side's next raster.

use serde::Deserialize;
use tracing::{debug, trace};

use rasq_core::dag::OperatorKind;
use rasq_core::error::{Error, Result};
use rasq_core::query::QueryRectangle;
use rasq_core::raster::{is_nodata, PixelType, RasterBuffer};
use rasq_core::tile::{Order, TileDescriptorInfo};
use rasq_core::time::TemporalExtent;

use crate::cache::SharedTile;
use crate::descriptor::{Payload, TileDescriptor};
use crate::traits::{BoxedOperator, Cursor, Lifecycle, OpState, Operator, Pull, SkipUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combiner {
    /// `a * factor + b`
    #[default]
    Pack,
    Add,
    Subtract,
    Multiply,
    Mean,
    Min,
    Max,
}

impl Combiner {
    pub fn apply(self, factor: f64, a: f64, b: f64) -> f64 {
        match self {
            Combiner::Pack => a * factor + b,
            Combiner::Add => a + b,
            Combiner::Subtract => a - b,
            Combiner::Multiply => a * b,
            Combiner::Mean => (a + b) / 2.0,
            Combiner::Min => a.min(b),
            Combiner::Max => a.max(b),
        }
    }
}

fn default_factor() -> f64 {
    1000.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemporalOverlapParams {
    #[serde(default)]
    pub combiner: Combiner,
    #[serde(default = "default_factor")]
    pub factor: f64,
    #[serde(default)]
    pub pixel_type: Option<PixelType>,
}

impl Default for TemporalOverlapParams {
    fn default() -> Self {
        Self {
            combiner: Combiner::default(),
            factor: default_factor(),
            pixel_type: None,
        }
    }
}

pub struct OverlapJob {
    left: Box<TileDescriptor>,
    right: Box<TileDescriptor>,
    combiner: Combiner,
    factor: f64,
}

impl OverlapJob {
    pub fn evaluate(self, info: &TileDescriptorInfo) -> Result<RasterBuffer> {
        let (left, right) = (*self.left, *self.right);
        let (ln, rn) = (left.info().nodata, right.info().nodata);
        let a = left.evaluate()?;
        let b = right.evaluate()?;
        if a.len() != b.len() {
            return Err(Error::Consistency(format!(
                "overlap sides have {} and {} cells",
                a.len(),
                b.len()
            )));
        }
        let mut out = RasterBuffer::filled(info.pixel_type, info.tile_resolution, info.nodata);
        for i in 0..a.len() {
            let (x, y) = (a.get_index(i), b.get_index(i));
            if is_nodata(x, ln) || is_nodata(y, rn) {
                continue;
            }
            out.set_index(i, self.combiner.apply(self.factor, x, y));
        }
        Ok(out)
    }
}

/// Per-input bookkeeping.
struct Side {
    label: &'static str,
    input: BoxedOperator,
    /// Interval of the raster under this side's cursor.
    raster: Option<TemporalExtent>,
    tiles: usize,
    /// Tile 0 of `raster`, pulled but not consumed yet.
    head: Option<TileDescriptor>,
    /// Tiles of `raster` kept for a replay.
    cache: Vec<Option<SharedTile>>,
    caching: bool,
    /// `raster` is served from `cache`; the input already sits past it.
    replay: bool,
}

impl Side {
    fn new(label: &'static str, input: BoxedOperator) -> Self {
        Self {
            label,
            input,
            raster: None,
            tiles: 0,
            head: None,
            cache: Vec::new(),
            caching: false,
            replay: false,
        }
    }

    /// Make sure a raster is under the cursor; `false` at the end of input.
    fn load(&mut self) -> Result<bool> {
        if self.raster.is_some() {
            return Ok(true);
        }
        match self.input.next_descriptor()? {
            Pull::End => Ok(false),
            Pull::Tile(d) => {
                if d.info().tile_index != 0 {
                    return Err(Error::Consistency(format!(
                        "{} input of temporal_overlap starts a raster at tile {}",
                        self.label,
                        d.info().tile_index
                    )));
                }
                self.raster = Some(d.info().temporal);
                self.tiles = d.info().tile_count_total;
                self.head = Some(d);
                Ok(true)
            }
        }
    }

    fn begin_pair(&mut self, cache: bool) {
        self.caching = cache && !self.replay;
        if self.caching {
            self.cache = vec![None; self.tiles];
        }
    }

    /// Move past the current raster.
    fn advance(&mut self) -> Result<()> {
        if self.replay {
            self.cache.clear();
            self.replay = false;
        } else if self.head.take().is_some() {
            self.input.skip_current_raster(1)?;
        }
        self.caching = false;
        self.raster = None;
        Ok(())
    }

    /// Keep the current raster for the next pairing.
    fn hold(&mut self) {
        if self.caching {
            self.caching = false;
            self.replay = true;
        }
    }

    /// Tile `k` of the current raster, in pull order.
    fn take(&mut self, k: usize) -> Result<TileDescriptor> {
        if self.replay {
            return self.cached(k);
        }
        let d = match (k, self.head.take()) {
            (0, Some(d)) => d,
            _ => match self.input.next_descriptor()? {
                Pull::Tile(d) => d,
                Pull::End => {
                    return Err(Error::Consistency(format!(
                        "{} input of temporal_overlap ended inside a raster",
                        self.label
                    )))
                }
            },
        };
        if d.info().tile_index != k || Some(d.info().temporal) != self.raster {
            return Err(Error::Consistency(format!(
                "{} input of temporal_overlap delivered tile {} of [{}, {}) where tile {k} was expected",
                self.label,
                d.info().tile_index,
                d.info().temporal.t1,
                d.info().temporal.t2
            )));
        }
        if !self.caching {
            return Ok(d);
        }
        let shared = SharedTile::new(d);
        let out = shared.descriptor();
        self.cache[k] = Some(shared);
        Ok(out)
    }

    /// Tile `k` of the current raster without moving the cursor.
    fn peek(&mut self, k: usize) -> Result<Option<TileDescriptor>> {
        if self.replay {
            return self.cached(k).map(Some);
        }
        if let Some(Some(shared)) = self.cache.get(k) {
            return Ok(Some(shared.descriptor()));
        }
        self.input.get_descriptor(k)
    }

    fn cached(&self, k: usize) -> Result<TileDescriptor> {
        match self.cache.get(k) {
            Some(Some(shared)) => Ok(shared.descriptor()),
            _ => Err(Error::Consistency(format!(
                "{} side of temporal_overlap has no cached tile {k}",
                self.label
            ))),
        }
    }
}

/// The raster pair being emitted.
#[derive(Debug, Clone, Copy)]
struct Pair {
    left: TemporalExtent,
    right: TemporalExtent,
    temporal: TemporalExtent,
    tiles: usize,
    next_tile: usize,
}

pub struct TemporalOverlapOp {
    query: QueryRectangle,
    params: TemporalOverlapParams,
    left: Side,
    right: Side,
    life: Lifecycle,
    cursor: Cursor,
    pair: Option<Pair>,
}

impl TemporalOverlapOp {
    pub fn new(
        query: QueryRectangle,
        params: TemporalOverlapParams,
        left: BoxedOperator,
        right: BoxedOperator,
    ) -> Self {
        Self {
            query,
            params,
            left: Side::new("left", left),
            right: Side::new("right", right),
            life: Lifecycle::new(OperatorKind::TemporalOverlap.name()),
            cursor: Cursor::default(),
            pair: None,
        }
    }

    /// Release the finished pair: the side that ends first moves on, the
    /// other keeps its raster (cached) for the next pairing.
    fn finish_pair(&mut self, pair: Pair) -> Result<()> {
        if pair.left.t2 <= pair.right.t2 {
            self.left.advance()?;
        } else {
            self.left.hold();
        }
        if pair.right.t2 <= pair.left.t2 {
            self.right.advance()?;
        } else {
            self.right.hold();
        }
        Ok(())
    }

    /// Find the next overlapping raster pair; `None` when either side ends.
    fn align(&mut self) -> Result<Option<Pair>> {
        loop {
            if !self.left.load()? || !self.right.load()? {
                return Ok(None);
            }
            let (Some(a), Some(b)) = (self.left.raster, self.right.raster) else {
                return Ok(None);
            };
            let Some(temporal) = a.intersection(&b) else {
                if a.t2 <= b.t2 {
                    trace!(t1 = a.t1, t2 = a.t2, "skipping left raster");
                    self.left.advance()?;
                } else {
                    trace!(t1 = b.t1, t2 = b.t2, "skipping right raster");
                    self.right.advance()?;
                }
                continue;
            };
            if self.left.tiles != self.right.tiles {
                return Err(Error::Consistency(format!(
                    "temporal_overlap inputs have {} and {} tiles per raster",
                    self.left.tiles, self.right.tiles
                )));
            }
            self.left.begin_pair(a.t2 > b.t2);
            self.right.begin_pair(b.t2 > a.t2);
            let pair = Pair {
                left: a,
                right: b,
                temporal,
                tiles: self.left.tiles,
                next_tile: 0,
            };
            self.pair = Some(pair);
            return Ok(Some(pair));
        }
    }

    fn combine(&self, pair: &Pair, left: TileDescriptor, right: TileDescriptor) -> TileDescriptor {
        let mut info = *left.info();
        info.temporal = pair.temporal;
        info.order = self.query.order;
        info.only_nodata = left.info().only_nodata || right.info().only_nodata;
        if let Some(pt) = self.params.pixel_type {
            info.pixel_type = pt;
        }
        TileDescriptor::new(
            info,
            Payload::Overlap(OverlapJob {
                left: Box::new(left),
                right: Box::new(right),
                combiner: self.params.combiner,
                factor: self.params.factor,
            }),
        )
    }

    fn produce(&mut self) -> Result<Pull> {
        if let Some(pair) = self.pair {
            if pair.next_tile >= pair.tiles {
                self.pair = None;
                self.finish_pair(pair)?;
            }
        }
        let mut pair = match self.pair {
            Some(pair) => pair,
            None => match self.align()? {
                Some(pair) => pair,
                None => return Ok(Pull::End),
            },
        };
        let k = pair.next_tile;
        let left = self.left.take(k)?;
        let right = self.right.take(k)?;
        pair.next_tile += 1;
        self.pair = Some(pair);
        Ok(Pull::Tile(self.combine(&pair, left, right)))
    }

    fn skip(&mut self, unit: SkipUnit, count: usize) -> Result<()> {
        let mut cursor = std::mem::take(&mut self.cursor);
        let res = cursor.skip(unit, Order::TimeMajor, count, || self.produce());
        self.cursor = cursor;
        if !res? {
            self.life.exhaust();
        }
        Ok(())
    }
}

impl Operator for TemporalOverlapOp {
    fn kind(&self) -> OperatorKind {
        OperatorKind::TemporalOverlap
    }

    fn query(&self) -> &QueryRectangle {
        &self.query
    }

    fn state(&self) -> OpState {
        self.life.state()
    }

    fn children(&self) -> Vec<&dyn Operator> {
        vec![self.left.input.as_ref(), self.right.input.as_ref()]
    }

    fn initialize(&mut self) -> Result<()> {
        self.life.initialize()?;
        let orders = [
            self.query.order,
            self.left.input.query().order,
            self.right.input.query().order,
        ];
        if orders.iter().any(|o| *o != Order::TimeMajor) {
            return Err(Error::Config(
                "temporal_overlap needs time-major inputs and output; insert an order_changer".into(),
            ));
        }
        self.left.input.initialize()?;
        self.right.input.initialize()?;
        debug!(combiner = ?self.params.combiner, "temporal overlap initialized");
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
                Ok(Pull::End)
            }
        }
    }

    fn get_descriptor(&mut self, tile_index: usize) -> Result<Option<TileDescriptor>> {
        self.life.check("get_descriptor")?;
        if self.life.is_exhausted() {
            return Ok(None);
        }
        let pair = match self.pair {
            Some(pair) => pair,
            None => match self.align()? {
                Some(pair) => pair,
                None => return Ok(None),
            },
        };
        if tile_index >= pair.tiles {
            return Err(Error::Geometry(format!(
                "tile index {tile_index} outside a raster of {} tiles",
                pair.tiles
            )));
        }
        let (Some(left), Some(right)) = (self.left.peek(tile_index)?, self.right.peek(tile_index)?)
        else {
            return Ok(None);
        };
        Ok(Some(self.combine(&pair, left, right)))
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
        let left = self
            .left
            .input
            .rebuild(&query.with_order(self.left.input.query().order))?;
        let right = self
            .right
            .input
            .rebuild(&query.with_order(self.right.input.query().order))?;
        Ok(Box::new(Self::new(*query, self.params.clone(), left, right)))
    }
}
