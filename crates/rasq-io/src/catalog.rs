//! Dataset name -> backend resolution for source operators.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use rasq_core::config::EngineConfig;
use rasq_core::error::{Error, Result};
use rasq_core::raster::RasterBuffer;
use rasq_core::time::{deserialize_timestamp, TemporalExtent, TimeStep, Timestamp};
use rasq_operators::backend::{Backend, BackendProvider};

use crate::grid::DatasetGrid;
use crate::memory::MemoryBackend;
use crate::readers::json::JsonRasterBackend;
use crate::synthetic::{Pattern, SyntheticBackend};

/// One raster of an inline dataset; `null` cells are nodata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineRaster {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub t1: Timestamp,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub t2: Timestamp,
    pub values: Vec<Option<f64>>,
}

/// Declarative dataset description (the `datasets:` section of a query file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatasetSpec {
    Memory {
        grid: DatasetGrid,
        rasters: Vec<InlineRaster>,
    },
    Synthetic {
        grid: DatasetGrid,
        #[serde(deserialize_with = "deserialize_timestamp")]
        start: Timestamp,
        #[serde(deserialize_with = "deserialize_timestamp")]
        end: Timestamp,
        step: TimeStep,
        pattern: Pattern,
    },
    /// Directory readable by [`JsonRasterBackend`]; relative paths resolve
    /// against the configured data dir.
    Json { path: String },
}

impl DatasetSpec {
    pub fn build(&self, name: &str, config: &EngineConfig) -> Result<Arc<dyn Backend>> {
        match self {
            DatasetSpec::Memory { grid, rasters } => {
                let mut backend = MemoryBackend::new(name, grid.clone())?;
                for r in rasters {
                    let values: Vec<f64> = r
                        .values
                        .iter()
                        .map(|v| v.unwrap_or(grid.nodata))
                        .collect();
                    let raster = RasterBuffer::from_vec(grid.resolution, values)?;
                    backend.push(TemporalExtent::new(r.t1, r.t2)?, raster)?;
                }
                Ok(Arc::new(backend))
            }
            DatasetSpec::Synthetic {
                grid,
                start,
                end,
                step,
                pattern,
            } => Ok(Arc::new(SyntheticBackend::new(
                name,
                grid.clone(),
                TemporalExtent::new(*start, *end)?,
                *step,
                pattern.clone(),
            )?)),
            DatasetSpec::Json { path } => Ok(Arc::new(JsonRasterBackend::open(
                name,
                config.resolve_path(path),
                config.handle_cache_capacity,
            )?)),
        }
    }
}

#[derive(Default, Clone)]
pub struct Catalog {
    backends: BTreeMap<String, Arc<dyn Backend>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs(specs: &BTreeMap<String, DatasetSpec>, config: &EngineConfig) -> Result<Self> {
        let mut catalog = Self::new();
        for (name, spec) in specs {
            catalog.register(name, spec.build(name, config)?);
        }
        debug!(datasets = catalog.backends.len(), "catalog built");
        Ok(catalog)
    }

    /// Register (or replace) a dataset.
    pub fn register(&mut self, name: impl Into<String>, backend: Arc<dyn Backend>) {
        self.backends.insert(name.into(), backend);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }
}

impl BackendProvider for Catalog {
    fn backend(&self, dataset: &str) -> Result<Arc<dyn Backend>> {
        self.backends
            .get(dataset)
            .cloned()
            .ok_or_else(|| Error::Config(format!("unknown dataset '{dataset}'")))
    }
}
