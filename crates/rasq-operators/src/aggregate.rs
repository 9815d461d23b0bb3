//! Temporal aggregation: fold each tile's rasters into time buckets.
//!
//! Tile-major only. Buckets are laid out from the query's t1 with the
//! configured step (one bucket over the whole query without a step) and
//! restart for every tile series.

use serde::Deserialize;
use tracing::{debug, trace};

use rasq_core::dag::OperatorKind;
use rasq_core::error::{Error, Result};
use rasq_core::query::QueryRectangle;
use rasq_core::raster::{is_nodata, PixelType, RasterBuffer};
use rasq_core::tile::{Order, TileDescriptorInfo};
use rasq_core::time::{TemporalExtent, TimeStep, Timestamp};

use crate::descriptor::{Payload, TileDescriptor};
use crate::traits::{BoxedOperator, Cursor, Lifecycle, OpState, Operator, Pull, SkipUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    #[serde(alias = "avg")]
    Mean,
    Min,
    Max,
    Sum,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregatorParams {
    pub function: AggregateFunction,
    #[serde(default)]
    pub pixel_type: Option<PixelType>,
    #[serde(default)]
    pub bucket: Option<TimeStep>,
}

/// Deferred per-cell fold over the members of one bucket.
pub struct FoldJob {
    function: AggregateFunction,
    inputs: Vec<TileDescriptor>,
}

impl FoldJob {
    pub fn evaluate(self, info: &TileDescriptorInfo) -> Result<RasterBuffer> {
        let cells = info.tile_resolution.len();
        let mut acc = vec![0.0f64; cells];
        let mut seen = vec![0u32; cells];
        for input in self.inputs {
            if input.info().only_nodata {
                continue;
            }
            let nodata = input.info().nodata;
            let raster = input.evaluate()?;
            if raster.len() != cells {
                return Err(Error::Consistency(format!(
                    "aggregator member has {} cells, expected {cells}",
                    raster.len()
                )));
            }
            for i in 0..cells {
                let v = raster.get_index(i);
                if is_nodata(v, nodata) {
                    continue;
                }
                let n = seen[i];
                acc[i] = if n == 0 {
                    v
                } else {
                    match self.function {
                        AggregateFunction::Mean => (acc[i] * n as f64 + v) / (n as f64 + 1.0),
                        AggregateFunction::Min => acc[i].min(v),
                        AggregateFunction::Max => acc[i].max(v),
                        AggregateFunction::Sum => acc[i] + v,
                    }
                };
                seen[i] = n + 1;
            }
        }
        let mut out = RasterBuffer::filled(info.pixel_type, info.tile_resolution, info.nodata);
        for i in 0..cells {
            if seen[i] > 0 {
                out.set_index(i, acc[i]);
            }
        }
        Ok(out)
    }
}

pub struct AggregatorOp {
    query: QueryRectangle,
    params: AggregatorParams,
    input: BoxedOperator,
    life: Lifecycle,
    cursor: Cursor,

    /// Single-slot lookahead: the first input past the last bucket.
    lookahead: Option<TileDescriptor>,
    /// Last bucket handed out and the tile it belonged to.
    bucket: Option<(usize, TemporalExtent)>,
}

impl AggregatorOp {
    pub fn new(query: QueryRectangle, params: AggregatorParams, input: BoxedOperator) -> Self {
        Self {
            query,
            params,
            input,
            life: Lifecycle::new(OperatorKind::Aggregator.name()),
            cursor: Cursor::default(),
            lookahead: None,
            bucket: None,
        }
    }

    fn first_bucket(&self) -> Result<TemporalExtent> {
        let t1 = self.query.temporal.t1;
        match self.params.bucket {
            Some(step) => TemporalExtent::new(t1, step.advance(t1)?),
            None => Ok(self.query.temporal),
        }
    }

    fn next_bucket(&self, bucket: TemporalExtent) -> Result<TemporalExtent> {
        match self.params.bucket {
            Some(step) => TemporalExtent::new(bucket.t2, step.advance(bucket.t2)?),
            None => Err(Error::Consistency(
                "aggregator input starts after the query window".into(),
            )),
        }
    }

    /// Bucket containing an input starting at `t1`, restarting from the
    /// query start for a new tile series.
    fn bucket_for(&self, tile: usize, t1: Timestamp) -> Result<TemporalExtent> {
        let mut bucket = match self.bucket {
            Some((prev_tile, prev)) if prev_tile == tile && prev.t1 <= t1 => prev,
            _ => self.first_bucket()?,
        };
        while bucket.t2 <= t1 {
            bucket = self.next_bucket(bucket)?;
        }
        Ok(bucket)
    }

    fn output_info(&self, mut info: TileDescriptorInfo, bucket: TemporalExtent) -> TileDescriptorInfo {
        info.temporal = bucket;
        info.order = self.query.order;
        if let Some(pt) = self.params.pixel_type {
            info.pixel_type = pt;
        }
        info
    }

    fn fold(&self, info: TileDescriptorInfo, members: Vec<TileDescriptor>) -> TileDescriptor {
        let mut info = info;
        info.only_nodata = members.iter().all(|d| d.info().only_nodata);
        TileDescriptor::new(
            info,
            Payload::Fold(FoldJob {
                function: self.params.function,
                inputs: members,
            }),
        )
    }

    fn produce(&mut self) -> Result<Pull> {
        let first = match self.lookahead.take() {
            Some(d) => d,
            None => match self.input.next_descriptor()? {
                Pull::Tile(d) => d,
                Pull::End => return Ok(Pull::End),
            },
        };
        let tile = first.info().tile_index;
        let bucket = self.bucket_for(tile, first.info().temporal.t1)?;
        let info = self.output_info(*first.info(), bucket);
        let mut members = vec![first];
        loop {
            match self.input.next_descriptor()? {
                Pull::End => break,
                Pull::Tile(d) => {
                    if d.info().tile_index == tile && d.info().temporal.t1 < bucket.t2 {
                        members.push(d);
                    } else {
                        self.lookahead = Some(d);
                        break;
                    }
                }
            }
        }
        self.bucket = Some((tile, bucket));
        trace!(tile, t1 = bucket.t1, t2 = bucket.t2, members = members.len(), "aggregated bucket");
        Ok(Pull::Tile(self.fold(info, members)))
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

impl Operator for AggregatorOp {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Aggregator
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
        if self.query.order != Order::TileMajor || self.input.query().order != Order::TileMajor {
            return Err(Error::Config(
                "aggregator needs a tile-major input and output; insert an order_changer".into(),
            ));
        }
        if let Some(step) = self.params.bucket {
            step.validate()?;
        }
        self.input.initialize()?;
        debug!(function = ?self.params.function, bucket = ?self.params.bucket, "aggregator initialized");
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

    /// Replays the input over the tile's footprint from the series start and
    /// folds the members of the active bucket.
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
        let bucket = active.temporal;

        let replay_query = footprint
            .with_temporal(TemporalExtent::new(self.query.temporal.t1, bucket.t2)?)
            .with_order(self.input.query().order);
        let mut replay = self.input.reinstantiate(&replay_query)?;
        let mut members = Vec::new();
        while let Pull::Tile(d) = replay.next_descriptor()? {
            let t1 = d.info().temporal.t1;
            let in_bucket = t1 < bucket.t2 && (t1 >= bucket.t1 || bucket.t1 == self.query.temporal.t1);
            if in_bucket {
                members.push(d);
            }
        }

        let Some(first) = members.first() else {
            let info = self.query.relabel(active, tile_index)?;
            return Ok(Some(TileDescriptor::nodata(info)));
        };
        let info = self.output_info(self.query.relabel(*first.info(), tile_index)?, bucket);
        Ok(Some(self.fold(info, members)))
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
