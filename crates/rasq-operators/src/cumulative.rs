//! Running per-tile accumulation over time.
//!
//! Each tile index owns a `RunningSum`. Output descriptors address a position
//! in that sum; evaluating position `k` folds the pending inputs up to `k` and
//! returns the accumulated cells.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use serde::Deserialize;
use tracing::{debug, trace};

use rasq_core::dag::OperatorKind;
use rasq_core::error::{Error, Result};
use rasq_core::query::QueryRectangle;
use rasq_core::raster::{is_nodata, PixelType, RasterBuffer};
use rasq_core::tile::TileDescriptorInfo;
use rasq_core::time::{TemporalExtent, Timestamp};

use crate::descriptor::{Payload, TileDescriptor};
use crate::traits::{BoxedOperator, Cursor, Lifecycle, OpState, Operator, Pull, SkipUnit};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CumulativeSumParams {
    #[serde(default)]
    pub pixel_type: Option<PixelType>,
}

/// Accumulator for one tile series.
///
/// Inputs are folded lazily, when a position at or past them is evaluated.
/// Until then `pending` holds every input of the series pushed since the
/// last evaluation, skipped ones included: a consumer that never evaluates
/// keeps one queued descriptor (metadata and a deferred read, no cells) per
/// pulled raster of the tile. The queue is dropped with the operator, and
/// the whole map is cleared at end of stream.
pub struct RunningSum {
    cells: Vec<f64>,
    live: Vec<bool>,
    /// Inputs handed out but not folded yet, oldest first.
    pending: VecDeque<TileDescriptor>,
    /// Positions folded so far.
    folded: usize,
    /// Positions pushed so far.
    pushed: usize,
    last_t1: Timestamp,
    all_nodata: bool,
}

impl RunningSum {
    fn new(cells: usize) -> Self {
        Self {
            cells: vec![0.0; cells],
            live: vec![false; cells],
            pending: VecDeque::new(),
            folded: 0,
            pushed: 0,
            last_t1: Timestamp::MIN,
            all_nodata: true,
        }
    }

    /// Queue an input; returns its position.
    fn push(&mut self, input: TileDescriptor) -> usize {
        self.last_t1 = input.info().temporal.t1;
        self.all_nodata &= input.info().only_nodata;
        self.pending.push_back(input);
        self.pushed += 1;
        self.pushed - 1
    }

    fn fold_one(&mut self, input: TileDescriptor) -> Result<()> {
        self.folded += 1;
        if input.info().only_nodata {
            return Ok(());
        }
        let nodata = input.info().nodata;
        let raster = input.evaluate()?;
        if raster.len() != self.cells.len() {
            return Err(Error::Consistency(format!(
                "cumulative input has {} cells, expected {}",
                raster.len(),
                self.cells.len()
            )));
        }
        for i in 0..self.cells.len() {
            let v = raster.get_index(i);
            if is_nodata(v, nodata) {
                continue;
            }
            self.cells[i] += v;
            self.live[i] = true;
        }
        Ok(())
    }

    pub fn evaluate(
        slot: &Rc<RefCell<RunningSum>>,
        position: usize,
        info: &TileDescriptorInfo,
    ) -> Result<RasterBuffer> {
        let mut sum = slot.borrow_mut();
        if position + 1 < sum.folded {
            return Err(Error::State(format!(
                "cumulative position {position} of tile {} evaluated after position {}",
                info.tile_index,
                sum.folded - 1
            )));
        }
        while sum.folded <= position {
            let Some(input) = sum.pending.pop_front() else {
                return Err(Error::Consistency(format!(
                    "cumulative position {position} was never queued"
                )));
            };
            sum.fold_one(input)?;
        }
        let mut out = RasterBuffer::filled(info.pixel_type, info.tile_resolution, info.nodata);
        for i in 0..sum.cells.len() {
            if sum.live[i] {
                out.set_index(i, sum.cells[i]);
            }
        }
        Ok(out)
    }
}

pub struct CumulativeSumOp {
    query: QueryRectangle,
    params: CumulativeSumParams,
    input: BoxedOperator,
    life: Lifecycle,
    cursor: Cursor,
    sums: HashMap<usize, Rc<RefCell<RunningSum>>>,
}

impl CumulativeSumOp {
    pub fn new(query: QueryRectangle, params: CumulativeSumParams, input: BoxedOperator) -> Self {
        Self {
            query,
            params,
            input,
            life: Lifecycle::new(OperatorKind::CumulativeSum.name()),
            cursor: Cursor::default(),
            sums: HashMap::new(),
        }
    }

    fn output_info(&self, mut info: TileDescriptorInfo, only_nodata: bool) -> TileDescriptorInfo {
        if let Some(pt) = self.params.pixel_type {
            info.pixel_type = pt;
        }
        info.order = self.query.order;
        info.only_nodata = only_nodata;
        info
    }

    fn produce(&mut self) -> Result<Pull> {
        let d = match self.input.next_descriptor()? {
            Pull::Tile(d) => d,
            Pull::End => return Ok(Pull::End),
        };
        let tile = d.info().tile_index;
        let t1 = d.info().temporal.t1;
        let restart = match self.sums.get(&tile) {
            Some(slot) => t1 <= slot.borrow().last_t1,
            None => true,
        };
        if restart {
            trace!(tile, t1, "cumulative series restart");
            let cells = d.info().tile_resolution.len();
            self.sums
                .insert(tile, Rc::new(RefCell::new(RunningSum::new(cells))));
        }
        let slot = self
            .sums
            .get(&tile)
            .cloned()
            .ok_or_else(|| Error::Consistency(format!("no running sum for tile {tile}")))?;
        let info = *d.info();
        let (position, all_nodata) = {
            let mut sum = slot.borrow_mut();
            let position = sum.push(d);
            (position, sum.all_nodata)
        };
        Ok(Pull::Tile(TileDescriptor::new(
            self.output_info(info, all_nodata),
            Payload::Running { slot, position },
        )))
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

impl Operator for CumulativeSumOp {
    fn kind(&self) -> OperatorKind {
        OperatorKind::CumulativeSum
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
        self.input.initialize()?;
        debug!(order = %self.query.order, "cumulative sum initialized");
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
                self.sums.clear();
                Ok(Pull::End)
            }
        }
    }

    /// Replays `[query.t1, active.t2)` over the tile's footprint and folds it
    /// into a fresh accumulator.
    fn get_descriptor(&mut self, tile_index: usize) -> Result<Option<TileDescriptor>> {
        self.life.check("get_descriptor")?;
        let footprint = self.query.tile_footprint(tile_index)?;
        if self.life.is_exhausted() {
            return Ok(None);
        }
        let mut cursor = std::mem::take(&mut self.cursor);
        let active = cursor.active_or_pull(|| self.produce());
        self.cursor = cursor;
        let Some(active) = active? else {
            return Ok(None);
        };

        let replay_query = footprint
            .with_temporal(TemporalExtent::new(self.query.temporal.t1, active.temporal.t2)?)
            .with_order(self.input.query().order);
        let mut replay = self.input.reinstantiate(&replay_query)?;
        let mut sum = RunningSum::new(self.query.tile_resolution.len());
        let mut last = None;
        while let Pull::Tile(d) = replay.next_descriptor()? {
            last = Some(*d.info());
            sum.push(d);
        }
        let Some(last) = last else {
            let info = self.query.relabel(active, tile_index)?;
            return Ok(Some(TileDescriptor::nodata(info)));
        };
        let position = sum.pushed - 1;
        let info = self.output_info(self.query.relabel(last, tile_index)?, sum.all_nodata);
        Ok(Some(TileDescriptor::new(
            info,
            Payload::Running {
                slot: Rc::new(RefCell::new(sum)),
                position,
            },
        )))
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
        let input = self
            .input
            .rebuild(&query.with_order(self.input.query().order))?;
        Ok(Box::new(Self::new(*query, self.params.clone(), input)))
    }
}
