//! YAML query documents.
//!
//! Example:
//! ```yaml
//! config:
//!   max_materialized_tiles: 4096
//! query:
//!   start: "2020-01-01"
//!   end: "2021-01-01"
//!   extent: { x1: 0.0, y1: 0.0, x2: 64.0, y2: 64.0 }
//!   resolution: { x: 64, y: 64 }
//!   tile_resolution: { x: 16, y: 16 }
//!   order: tile_major
//! datasets:
//!   ndvi:
//!     kind: json
//!     path: data/ndvi
//! root:
//!   operator: aggregator
//!   params: { function: mean, bucket: { unit: month } }
//!   inputs:
//!     - operator: source
//!       params: { dataset: ndvi }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use rasq_core::config::EngineConfig;
use rasq_core::geometry::{Resolution, SpatialExtent};
use rasq_core::query::QueryRectangle;
use rasq_core::tile::Order;
use rasq_core::time::{deserialize_timestamp, TemporalExtent, Timestamp};
use rasq_io::DatasetSpec;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryDocument {
    #[serde(default)]
    pub config: Option<QueryConfig>,
    pub query: QuerySpec,
    #[serde(default)]
    pub datasets: BTreeMap<String, DatasetSpec>,
    pub root: NodeSpec,
}

/// Per-query overrides of [`EngineConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    pub max_materialized_tiles: Option<usize>,
    pub handle_cache_capacity: Option<usize>,
    pub data_dir: Option<String>,
}

impl QueryConfig {
    pub fn apply(&self, cfg: &mut EngineConfig) {
        if let Some(v) = self.max_materialized_tiles {
            cfg.max_materialized_tiles = v;
        }
        if let Some(v) = self.handle_cache_capacity {
            cfg.handle_cache_capacity = v;
        }
        if let Some(v) = &self.data_dir {
            cfg.data_dir = v.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuerySpec {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub start: Timestamp,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub end: Timestamp,
    pub extent: SpatialExtent,
    pub resolution: Resolution,
    pub tile_resolution: Resolution,
    /// Order the consumer wants; the root operator's native order when absent.
    #[serde(default)]
    pub order: Option<Order>,
}

impl QuerySpec {
    /// The query rectangle in `order`, validated.
    pub fn rectangle(&self, order: Order) -> Result<QueryRectangle> {
        let q = QueryRectangle {
            temporal: TemporalExtent::new(self.start, self.end)?,
            spatial: self.extent,
            resolution: self.resolution,
            tile_resolution: self.tile_resolution,
            order,
        };
        q.validate()?;
        Ok(q)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSpec {
    pub operator: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub inputs: Vec<NodeSpec>,
}

pub fn parse_query_document(yaml_src: &str) -> Result<QueryDocument> {
    Ok(serde_yaml::from_str(yaml_src)?)
}
