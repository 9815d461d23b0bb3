//! Operator trait + the shared pull/skip bookkeeping.
//!
//! Every operator is pulled synchronously by its parent. Payloads stay
//! deferred until a consumer evaluates them, so skipping descriptors never
//! touches pixel data.

use rasq_core::dag::OperatorKind;
use rasq_core::error::{Error, Result};
use rasq_core::query::QueryRectangle;
use rasq_core::tile::{Order, TileDescriptorInfo};

use crate::cache::CacheStats;
use crate::descriptor::TileDescriptor;

/// Result of one pull: a tile, or the end of the series.
#[derive(Debug)]
pub enum Pull {
    Tile(TileDescriptor),
    End,
}

impl Pull {
    pub fn is_end(&self) -> bool {
        matches!(self, Pull::End)
    }

    pub fn into_tile(self) -> Option<TileDescriptor> {
        match self {
            Pull::Tile(d) => Some(d),
            Pull::End => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpState {
    Uninitialized,
    Initialized,
    Iterating,
    Exhausted,
}

pub type BoxedOperator = Box<dyn Operator>;

/// Trait that all operators must implement.
///
/// Invariants:
/// - `next_descriptor`, `get_descriptor` and the skips fail with a state
///   error before `initialize`; `initialize` runs once.
/// - Once `next_descriptor` returned `End` it keeps returning `End`.
/// - `get_descriptor` addresses the active raster: the pre-advanced one after
///   a skip, else the last emitted one, else the first.
pub trait Operator {
    fn kind(&self) -> OperatorKind;

    /// Human-readable operator name (stable).
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    fn query(&self) -> &QueryRectangle;

    fn state(&self) -> OpState;

    fn supports_order(&self, order: Order) -> bool {
        self.kind().supports_order(order)
    }

    fn children(&self) -> Vec<&dyn Operator> {
        Vec::new()
    }

    /// Hit/miss counters for caching operators.
    fn cache_stats(&self) -> Option<CacheStats> {
        None
    }

    fn initialize(&mut self) -> Result<()>;

    fn next_descriptor(&mut self) -> Result<Pull>;

    fn get_descriptor(&mut self, tile_index: usize) -> Result<Option<TileDescriptor>>;

    fn skip_current_raster(&mut self, count: usize) -> Result<()>;

    fn skip_current_tile(&mut self, count: usize) -> Result<()>;

    /// An uninitialized copy of this operator and its subtree scoped to
    /// `query`. Children keep their own traversal order.
    fn rebuild(&self, query: &QueryRectangle) -> Result<BoxedOperator>;

    /// An independent, initialized copy scoped to `query`.
    fn reinstantiate(&self, query: &QueryRectangle) -> Result<BoxedOperator> {
        let mut op = self.rebuild(query)?;
        op.initialize()?;
        Ok(op)
    }
}

/// Lifecycle state with the checks every operator performs.
#[derive(Debug)]
pub struct Lifecycle {
    name: &'static str,
    state: OpState,
}

impl Lifecycle {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: OpState::Uninitialized,
        }
    }

    pub fn state(&self) -> OpState {
        self.state
    }

    pub fn initialize(&mut self) -> Result<()> {
        if self.state != OpState::Uninitialized {
            return Err(Error::State(format!("{} initialized twice", self.name)));
        }
        self.state = OpState::Initialized;
        Ok(())
    }

    pub fn check(&self, call: &str) -> Result<()> {
        if self.state == OpState::Uninitialized {
            return Err(Error::State(format!(
                "{}: {call} called before initialize",
                self.name
            )));
        }
        Ok(())
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == OpState::Exhausted
    }

    pub fn iterating(&mut self) {
        if self.state == OpState::Initialized {
            self.state = OpState::Iterating;
        }
    }

    pub fn exhaust(&mut self) {
        self.state = OpState::Exhausted;
    }
}

/// The two skip granularities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipUnit {
    Raster,
    Tile,
}

impl SkipUnit {
    /// True when `next` lies past the raster/tile that `current` belongs to,
    /// given the traversal order.
    pub fn crosses(self, order: Order, current: &TileDescriptorInfo, next: &TileDescriptorInfo) -> bool {
        match (self, order) {
            (SkipUnit::Raster, Order::TimeMajor) => !current.same_raster(next),
            (SkipUnit::Tile, Order::TileMajor) => current.tile_index != next.tile_index,
            // the minor axis: every descriptor is its own step
            (SkipUnit::Raster, Order::TileMajor) | (SkipUnit::Tile, Order::TimeMajor) => {
                !current.same_position(next)
            }
        }
    }
}

/// Output-side cursor for operators that do not step a backend themselves:
/// remembers the last emitted tile and at most one pre-advanced descriptor.
#[derive(Debug, Default)]
pub struct Cursor {
    held: Option<TileDescriptor>,
    last: Option<TileDescriptorInfo>,
}

impl Cursor {
    pub fn take_held(&mut self) -> Option<TileDescriptor> {
        self.held.take()
    }

    pub fn emitted(&mut self, info: TileDescriptorInfo) {
        self.last = Some(info);
    }

    pub fn last(&self) -> Option<&TileDescriptorInfo> {
        self.last.as_ref()
    }

    /// Metadata of the active raster without pulling.
    pub fn active(&self) -> Option<TileDescriptorInfo> {
        self.held
            .as_ref()
            .map(|d| *d.info())
            .or(self.last)
    }

    /// Metadata of the active raster, pulling (and holding) the first
    /// descriptor when nothing has been emitted yet.
    pub fn active_or_pull<F>(&mut self, pull: F) -> Result<Option<TileDescriptorInfo>>
    where
        F: FnOnce() -> Result<Pull>,
    {
        if let Some(info) = self.active() {
            return Ok(Some(info));
        }
        match pull()? {
            Pull::Tile(d) => {
                let info = *d.info();
                self.held = Some(d);
                Ok(Some(info))
            }
            Pull::End => Ok(None),
        }
    }

    /// Advance past `count` rasters or tiles by pulling and discarding
    /// descriptors. The first descriptor of the next unit is held for the
    /// following `next_descriptor`. Returns `false` when the series ended.
    pub fn skip<F>(&mut self, unit: SkipUnit, order: Order, count: usize, mut pull: F) -> Result<bool>
    where
        F: FnMut() -> Result<Pull>,
    {
        if count == 0 {
            return Ok(true);
        }
        let mut current = match (self.held.take(), self.last) {
            (Some(d), _) => *d.info(),
            (None, Some(info)) => info,
            (None, None) => match pull()? {
                Pull::Tile(d) => *d.info(),
                Pull::End => return Ok(false),
            },
        };
        let mut remaining = count;
        loop {
            match pull()? {
                Pull::End => return Ok(false),
                Pull::Tile(d) => {
                    if unit.crosses(order, &current, d.info()) {
                        remaining -= 1;
                        if remaining == 0 {
                            self.held = Some(d);
                            return Ok(true);
                        }
                        current = *d.info();
                    }
                }
            }
        }
    }
}
