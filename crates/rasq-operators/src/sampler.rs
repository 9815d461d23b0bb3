//! Thinning and resampling of a raster series.
//!
//! Two modes:
//! - `skip`: keep one input raster, then drop `skip` whole rasters. Each kept
//!   raster is sent `1 + repeat` times with its own interval; the repeats are
//!   read back through `get_descriptor`. Time-major drops go through
//!   `skip_current_raster`; tile-major drops are plain pulls so a drop never
//!   runs into the next tile's series.
//! - `step`: sample times are `query.t1 + k*step` below `query.t2`. Each
//!   sample re-emits the input raster covering it, relabeled to
//!   `[s, s + step)` (clipped to the query end). A raster that covers several
//!   samples is re-sent through `get_descriptor` instead of being pulled
//!   again; samples no raster covers are dropped.

use serde::Deserialize;
use tracing::{debug, trace};

use rasq_core::dag::OperatorKind;
use rasq_core::error::{Error, Result};
use rasq_core::query::QueryRectangle;
use rasq_core::tile::{Order, TileDescriptorInfo};
use rasq_core::time::{TemporalExtent, TimeStep, Timestamp};

use crate::descriptor::TileDescriptor;
use crate::traits::{BoxedOperator, Cursor, Lifecycle, OpState, Operator, Pull, SkipUnit};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplerParams {
    #[serde(default)]
    pub step: Option<TimeStep>,
    /// Whole rasters dropped after each kept one.
    #[serde(default)]
    pub skip: Option<usize>,
    /// Extra sends of each kept raster (`skip` mode only).
    #[serde(default)]
    pub repeat: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Step(TimeStep),
    Count { skip: usize, repeat: usize },
}

impl SamplerParams {
    fn mode(&self) -> Result<Mode> {
        match (self.step, self.skip) {
            (Some(step), None) if self.repeat == 0 => {
                step.validate()?;
                Ok(Mode::Step(step))
            }
            (Some(_), None) => Err(Error::Config(
                "sampler: repeat only applies to skip sampling".into(),
            )),
            (None, Some(skip)) => Ok(Mode::Count {
                skip,
                repeat: self.repeat,
            }),
            _ => Err(Error::Config(
                "sampler needs exactly one of step or skip".into(),
            )),
        }
    }
}

pub struct SamplerOp {
    query: QueryRectangle,
    params: SamplerParams,
    mode: Mode,
    input: BoxedOperator,
    life: Lifecycle,
    cursor: Cursor,

    sample: Timestamp,
    /// Input raster under the cursor.
    current: Option<TileDescriptorInfo>,
    /// `current` itself when it has not been handed out yet.
    fresh: Option<TileDescriptor>,
    /// Time-major: next tile of the sample being emitted.
    next_tile: usize,
    /// Tile-major: tile series being sampled.
    tile: usize,

    /// Count mode: send of the current kept raster (0 = first).
    pass: usize,
    /// Count mode: position of `current` within its tile series.
    ordinal: usize,
    /// Count mode, time-major: drop is due before the next pull.
    drop_pending: bool,
}

impl SamplerOp {
    pub fn new(query: QueryRectangle, params: SamplerParams, input: BoxedOperator) -> Self {
        let sample = query.temporal.t1;
        Self {
            query,
            params,
            // replaced by `initialize`, which rejects bad params
            mode: Mode::Count { skip: 0, repeat: 0 },
            input,
            life: Lifecycle::new(OperatorKind::Sampler.name()),
            cursor: Cursor::default(),
            sample,
            current: None,
            fresh: None,
            next_tile: 0,
            tile: 0,
            pass: 0,
            ordinal: 0,
            drop_pending: false,
        }
    }

    fn advance_sample(&self, t: Timestamp) -> Result<Timestamp> {
        match self.mode {
            Mode::Step(step) => step.advance(t),
            Mode::Count { .. } => {
                Err(Error::State("sampler: no sample step in skip mode".into()))
            }
        }
    }

    fn window(&self, sample: Timestamp) -> Result<TemporalExtent> {
        let end = self.advance_sample(sample)?.min(self.query.temporal.t2);
        TemporalExtent::new(sample, end)
    }

    fn relabel(&self, d: TileDescriptor, sample: Timestamp) -> Result<TileDescriptor> {
        let temporal = self.window(sample)?;
        let order = self.query.order;
        Ok(d.map_info(|mut info| {
            info.temporal = temporal;
            info.order = order;
            info
        }))
    }

    fn pull_current(&mut self) -> Result<Option<TileDescriptorInfo>> {
        match self.input.next_descriptor()? {
            Pull::Tile(d) => {
                let info = *d.info();
                self.current = Some(info);
                self.fresh = Some(d);
                Ok(Some(info))
            }
            Pull::End => {
                self.current = None;
                self.fresh = None;
                Ok(None)
            }
        }
    }

    /// Tile `k` of the current input raster: the fresh pull if it is that
    /// tile, else random access.
    fn resend(&mut self, k: usize) -> Result<TileDescriptor> {
        if let Some(d) = self.fresh.take() {
            if d.info().tile_index == k {
                return Ok(d);
            }
        }
        self.input.get_descriptor(k)?.ok_or_else(|| {
            Error::Consistency(format!("sampler input has no tile {k} for the active raster"))
        })
    }

    fn produce(&mut self) -> Result<Pull> {
        match (self.mode, self.query.order) {
            (Mode::Count { skip, repeat }, Order::TimeMajor) => {
                self.produce_count_time_major(skip, repeat)
            }
            (Mode::Count { skip, repeat }, Order::TileMajor) => {
                self.produce_count_tile_major(skip, repeat)
            }
            (Mode::Step(_), Order::TimeMajor) => self.produce_time_major(),
            (Mode::Step(_), Order::TileMajor) => self.produce_tile_major(),
        }
    }

    /// Count mode: one send of `current` is complete; start the next send or
    /// schedule the drop.
    fn end_pass(&mut self, repeat: usize) {
        if self.pass < repeat {
            self.pass += 1;
        } else {
            self.pass = 0;
            self.drop_pending = true;
        }
    }

    fn produce_count_time_major(&mut self, skip: usize, repeat: usize) -> Result<Pull> {
        if self.pass > 0 {
            let current = self
                .current
                .ok_or_else(|| Error::State("sampler: repeat without a kept raster".into()))?;
            let k = self.next_tile;
            let d = self.input.get_descriptor(k)?.ok_or_else(|| {
                Error::Consistency(format!("sampler input has no tile {k} for the active raster"))
            })?;
            self.next_tile += 1;
            if self.next_tile >= current.tile_count_total {
                self.next_tile = 0;
                self.end_pass(repeat);
            }
            return Ok(Pull::Tile(d.with_order(self.query.order)));
        }
        if std::mem::take(&mut self.drop_pending) && skip > 0 {
            // from the last tile of the kept raster, `skip + 1` lands on the
            // first tile of the next kept one
            trace!(skip, "sampler drops rasters");
            self.input.skip_current_raster(skip + 1)?;
        }
        match self.input.next_descriptor()? {
            Pull::Tile(d) => {
                let info = *d.info();
                self.current = Some(info);
                if info.tile_index + 1 >= info.tile_count_total {
                    self.next_tile = 0;
                    self.end_pass(repeat);
                }
                Ok(Pull::Tile(d.with_order(self.query.order)))
            }
            Pull::End => Ok(Pull::End),
        }
    }

    fn produce_count_tile_major(&mut self, skip: usize, repeat: usize) -> Result<Pull> {
        if self.pass > 0 {
            let current = self
                .current
                .ok_or_else(|| Error::State("sampler: repeat without a kept raster".into()))?;
            let k = current.tile_index;
            let d = self.input.get_descriptor(k)?.ok_or_else(|| {
                Error::Consistency(format!("sampler input has no tile {k} for the active raster"))
            })?;
            self.end_pass(repeat);
            return Ok(Pull::Tile(d.with_order(self.query.order)));
        }
        self.drop_pending = false;
        loop {
            let d = match self.input.next_descriptor()? {
                Pull::Tile(d) => d,
                Pull::End => return Ok(Pull::End),
            };
            let info = *d.info();
            let same_tile = self.current.is_some_and(|c| c.tile_index == info.tile_index);
            self.ordinal = if same_tile { self.ordinal + 1 } else { 0 };
            self.current = Some(info);
            if self.ordinal % (skip + 1) != 0 {
                trace!(t1 = info.temporal.t1, tile = info.tile_index, "sampler drops raster");
                continue;
            }
            self.end_pass(repeat);
            return Ok(Pull::Tile(d.with_order(self.query.order)));
        }
    }

    fn produce_time_major(&mut self) -> Result<Pull> {
        loop {
            if self.sample >= self.query.temporal.t2 {
                return Ok(Pull::End);
            }
            let current = match self.current {
                Some(info) => info,
                None => match self.pull_current()? {
                    Some(info) => info,
                    None => return Ok(Pull::End),
                },
            };
            if current.temporal.t2 <= self.sample {
                trace!(t1 = current.temporal.t1, sample = self.sample, "sampler skips stale raster");
                self.fresh = None;
                self.current = None;
                self.input.skip_current_raster(1)?;
                continue;
            }
            if current.temporal.t1 > self.sample {
                self.sample = self.advance_sample(self.sample)?;
                continue;
            }
            let k = self.next_tile;
            let d = self.resend(k)?;
            let sample = self.sample;
            self.next_tile += 1;
            if self.next_tile >= current.tile_count_total {
                self.next_tile = 0;
                self.sample = self.advance_sample(self.sample)?;
            }
            return Ok(Pull::Tile(self.relabel(d, sample)?));
        }
    }

    fn produce_tile_major(&mut self) -> Result<Pull> {
        loop {
            if self.sample >= self.query.temporal.t2 {
                // samples of this tile are done
                match self.current {
                    Some(info) if info.tile_index != self.tile => self.tile = info.tile_index,
                    _ => {
                        self.current = None;
                        self.fresh = None;
                        self.input.skip_current_tile(1)?;
                        self.tile += 1;
                    }
                }
                self.sample = self.query.temporal.t1;
                continue;
            }
            let current = match self.current {
                Some(info) => info,
                None => match self.pull_current()? {
                    Some(info) => info,
                    None => return Ok(Pull::End),
                },
            };
            if current.tile_index != self.tile {
                // no raster of this tile covers the remaining samples
                self.sample = self.query.temporal.t2;
                continue;
            }
            if current.temporal.t2 <= self.sample {
                self.current = None;
                self.fresh = None;
                continue;
            }
            if current.temporal.t1 > self.sample {
                self.sample = self.advance_sample(self.sample)?;
                continue;
            }
            let d = self.resend(current.tile_index)?;
            let sample = self.sample;
            self.sample = self.advance_sample(self.sample)?;
            return Ok(Pull::Tile(self.relabel(d, sample)?));
        }
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

impl Operator for SamplerOp {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Sampler
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
        self.mode = self.params.mode()?;
        self.input.initialize()?;
        debug!(mode = ?self.mode, order = %self.query.order, "sampler initialized");
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
        let mut cursor = std::mem::take(&mut self.cursor);
        let active = cursor.active_or_pull(|| self.produce());
        self.cursor = cursor;
        let Some(active) = active? else {
            return Ok(None);
        };
        let Some(d) = self.input.get_descriptor(tile_index)? else {
            return Ok(None);
        };
        match self.mode {
            Mode::Step(_) => Ok(Some(self.relabel(d, active.temporal.t1)?)),
            Mode::Count { .. } => Ok(Some(d.with_order(self.query.order))),
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
        let input = self
            .input
            .rebuild(&query.with_order(self.input.query().order))?;
        Ok(Box::new(Self::new(*query, self.params.clone(), input)))
    }
}
