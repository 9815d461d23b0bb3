//! Evaluate-once tiles and the per-raster tile cache.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use rasq_core::dag::OperatorKind;
use rasq_core::error::{Error, Result};
use rasq_core::query::QueryRectangle;
use rasq_core::raster::RasterBuffer;
use rasq_core::tile::TileDescriptorInfo;
use rasq_core::time::TemporalExtent;

use crate::descriptor::{Payload, TileDescriptor};
use crate::traits::{BoxedOperator, Lifecycle, OpState, Operator, Pull};

enum SlotState {
    Pending(Payload),
    Evaluating,
    Ready(RasterBuffer),
    /// First evaluation failed; later readers get the same error.
    Failed(Error),
}

/// A descriptor whose payload is evaluated at most once; every handed-out
/// descriptor returns a view over the same cells.
#[derive(Clone)]
pub struct SharedTile {
    info: TileDescriptorInfo,
    slot: Rc<RefCell<SlotState>>,
}

impl SharedTile {
    pub fn new(descriptor: TileDescriptor) -> Self {
        let (info, payload) = descriptor.into_parts();
        Self {
            info,
            slot: Rc::new(RefCell::new(SlotState::Pending(payload))),
        }
    }

    pub fn info(&self) -> &TileDescriptorInfo {
        &self.info
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.slot.borrow(), SlotState::Ready(_))
    }

    pub fn descriptor(&self) -> TileDescriptor {
        TileDescriptor::new(self.info, Payload::Shared(self.clone()))
    }

    pub fn evaluate(&self) -> Result<RasterBuffer> {
        let mut slot = self.slot.borrow_mut();
        match std::mem::replace(&mut *slot, SlotState::Evaluating) {
            SlotState::Ready(raster) => {
                *slot = SlotState::Ready(raster.clone());
                Ok(raster)
            }
            SlotState::Pending(payload) => match payload.evaluate(&self.info) {
                Ok(raster) => {
                    *slot = SlotState::Ready(raster.clone());
                    Ok(raster)
                }
                Err(e) => {
                    *slot = SlotState::Failed(e.clone());
                    Err(e)
                }
            },
            SlotState::Failed(e) => {
                *slot = SlotState::Failed(e.clone());
                Err(e)
            }
            SlotState::Evaluating => Err(Error::State(format!(
                "shared tile {} [{}, {}) was interrupted while evaluating",
                self.info.tile_index, self.info.temporal.t1, self.info.temporal.t2
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheParams {}

/// Memoizes tile payloads for the lifetime of one raster. With `simulate`
/// set it only keeps the hit/miss bookkeeping and passes tiles through.
pub struct RasterCacheOp {
    query: QueryRectangle,
    input: BoxedOperator,
    life: Lifecycle,
    simulate: bool,

    raster: Option<TemporalExtent>,
    entries: HashMap<usize, Option<SharedTile>>,
    seen_first_tile: bool,
    stats: CacheStats,
}

impl RasterCacheOp {
    pub fn new(query: QueryRectangle, input: BoxedOperator) -> Self {
        Self::with_mode(query, input, false)
    }

    pub fn simulator(query: QueryRectangle, input: BoxedOperator) -> Self {
        Self::with_mode(query, input, true)
    }

    fn with_mode(query: QueryRectangle, input: BoxedOperator, simulate: bool) -> Self {
        let kind = if simulate {
            OperatorKind::CacheSimulator
        } else {
            OperatorKind::RasterCache
        };
        Self {
            query,
            input,
            life: Lifecycle::new(kind.name()),
            simulate,
            raster: None,
            entries: HashMap::new(),
            seen_first_tile: false,
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.raster = None;
        self.seen_first_tile = false;
    }

    fn enter_raster(&mut self, temporal: TemporalExtent) {
        if self.raster != Some(temporal) {
            self.clear();
            self.raster = Some(temporal);
        }
    }

    /// Serve `tile`, using `fresh` only on a miss.
    fn serve(&mut self, fresh: TileDescriptor) -> TileDescriptor {
        let tile = fresh.info().tile_index;
        if let Some(entry) = self.entries.get(&tile) {
            self.stats.hits += 1;
            trace!(tile, simulate = self.simulate, "cache hit");
            return match entry {
                Some(shared) => shared.descriptor(),
                None => fresh,
            };
        }
        self.stats.misses += 1;
        trace!(tile, simulate = self.simulate, "cache miss");
        if self.simulate {
            self.entries.insert(tile, None);
            return fresh;
        }
        let shared = SharedTile::new(fresh);
        let out = shared.descriptor();
        self.entries.insert(tile, Some(shared));
        out
    }
}

impl Operator for RasterCacheOp {
    fn kind(&self) -> OperatorKind {
        if self.simulate {
            OperatorKind::CacheSimulator
        } else {
            OperatorKind::RasterCache
        }
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

    fn cache_stats(&self) -> Option<CacheStats> {
        Some(self.stats)
    }

    fn initialize(&mut self) -> Result<()> {
        self.life.initialize()?;
        self.input.initialize()
    }

    fn next_descriptor(&mut self) -> Result<Pull> {
        self.life.check("next_descriptor")?;
        if self.life.is_exhausted() {
            return Ok(Pull::End);
        }
        let d = match self.input.next_descriptor()? {
            Pull::Tile(d) => d,
            Pull::End => {
                self.life.exhaust();
                self.clear();
                return Ok(Pull::End);
            }
        };
        self.enter_raster(d.info().temporal);
        if d.info().tile_index == 0 {
            if self.seen_first_tile {
                self.entries.clear();
            }
            self.seen_first_tile = true;
        }
        self.life.iterating();
        Ok(Pull::Tile(self.serve(d)))
    }

    fn get_descriptor(&mut self, tile_index: usize) -> Result<Option<TileDescriptor>> {
        self.life.check("get_descriptor")?;
        if self.life.is_exhausted() {
            return Ok(None);
        }
        let Some(d) = self.input.get_descriptor(tile_index)? else {
            return Ok(None);
        };
        self.enter_raster(d.info().temporal);
        Ok(Some(self.serve(d)))
    }

    fn skip_current_raster(&mut self, count: usize) -> Result<()> {
        self.life.check("skip_current_raster")?;
        self.clear();
        self.input.skip_current_raster(count)
    }

    fn skip_current_tile(&mut self, count: usize) -> Result<()> {
        self.life.check("skip_current_tile")?;
        self.clear();
        self.input.skip_current_tile(count)
    }

    fn rebuild(&self, query: &QueryRectangle) -> Result<BoxedOperator> {
        let input = self
            .input
            .rebuild(&query.with_order(self.input.query().order))?;
        Ok(Box::new(Self::with_mode(*query, input, self.simulate)))
    }
}
