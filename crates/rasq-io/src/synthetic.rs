//! Generated datasets on a regular (possibly calendar) time step.

use serde::{Deserialize, Serialize};

use rasq_core::error::{Error, Result};
use rasq_core::raster::RasterBuffer;
use rasq_core::time::{TemporalExtent, TimeStep, Timestamp};
use rasq_operators::backend::{Backend, DatasetMetadata, TileRequest};

use crate::grid::DatasetGrid;

/// Pixel value as a function of dataset pixel and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Pattern {
    Constant {
        value: f64,
    },
    /// `base + dx*x + dy*y + dt*(t - series start)`.
    Ramp {
        #[serde(default)]
        base: f64,
        #[serde(default)]
        dx: f64,
        #[serde(default)]
        dy: f64,
        #[serde(default)]
        dt: f64,
    },
    /// Alternating `low`/`high` squares of `size` pixels.
    Checker {
        size: usize,
        #[serde(default)]
        low: f64,
        high: f64,
    },
}

impl Pattern {
    fn value(&self, x: usize, y: usize, elapsed: i64) -> f64 {
        match *self {
            Pattern::Constant { value } => value,
            Pattern::Ramp { base, dx, dy, dt } => {
                base + dx * x as f64 + dy * y as f64 + dt * elapsed as f64
            }
            Pattern::Checker { size, low, high } => {
                let size = size.max(1);
                if (x / size + y / size) % 2 == 0 {
                    low
                } else {
                    high
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticBackend {
    name: String,
    grid: DatasetGrid,
    step: TimeStep,
    pattern: Pattern,
    metadata: DatasetMetadata,
}

impl SyntheticBackend {
    pub fn new(
        name: impl Into<String>,
        grid: DatasetGrid,
        temporal: TemporalExtent,
        step: TimeStep,
        pattern: Pattern,
    ) -> Result<Self> {
        grid.validate()?;
        step.validate()?;
        if let Pattern::Checker { size: 0, .. } = pattern {
            return Err(Error::Config("checker size must be positive".into()));
        }
        let metadata = grid.metadata(temporal);
        Ok(Self {
            name: name.into(),
            grid,
            step,
            pattern,
            metadata,
        })
    }

    pub fn step(&self) -> TimeStep {
        self.step
    }
}

impl Backend for SyntheticBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    fn advance(&self, t: Timestamp) -> Result<Timestamp> {
        self.step.advance(t)
    }

    fn validity_end(&self, t: Timestamp) -> Result<Timestamp> {
        Ok(self.step.advance(t)?.min(self.metadata.temporal.t2))
    }

    fn fill(&self, request: &TileRequest) -> Result<RasterBuffer> {
        if !self.metadata.temporal.contains(request.time) {
            return Err(Error::Backend(format!(
                "dataset '{}' has no raster at {}",
                self.name, request.time
            )));
        }
        let elapsed = request.time - self.metadata.temporal.t1;
        request.render(|x, y| {
            Ok(self
                .grid
                .index(x, y)
                .map(|_| self.pattern.value(x, y, elapsed)))
        })
    }
}
