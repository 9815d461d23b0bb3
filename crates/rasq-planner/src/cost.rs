//! Coarse work estimation for `explain`.
//!
//! We count descriptors: rasters per node times tiles per raster. Raster
//! counts of sources come from hints (the catalog knows them) and default to
//! one; everything above a source is derived from params and the query
//! window.

use serde::{Deserialize, Serialize};

use rasq_core::dag::OperatorKind;
use rasq_core::error::Result;
use rasq_core::tile::Order;
use rasq_core::time::{TimeStep, TimeUnit};

use crate::physical::{PhysicalNode, PhysicalProgram};

/// Optional hints you can pass in when estimating work.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkHint {
    /// Rasters inside the query window, by dataset name.
    pub source_rasters: Vec<(String, u64)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkEstimate {
    pub operators: u64,
    pub tiles_per_raster: u64,
    /// Rasters the root emits.
    pub output_rasters: u64,
    /// Descriptors produced across all nodes.
    pub descriptors: u64,
    /// Descriptors held by tile-major order changers.
    pub materialized_tiles: u64,
}

/// Average length of a step in seconds; calendar units use mean lengths.
fn step_seconds(step: &TimeStep) -> u64 {
    let unit = match step.unit.seconds() {
        Some(s) => s as u64,
        None if step.unit == TimeUnit::Month => 2_629_746,
        None => 31_556_952,
    };
    unit.saturating_mul(u64::from(step.length)).max(1)
}

fn step_param(node: &PhysicalNode, key: &str) -> Option<TimeStep> {
    node.params
        .get(key)
        .and_then(|v| serde_json::from_value::<TimeStep>(v.clone()).ok())
}

fn count_param(node: &PhysicalNode, key: &str) -> u64 {
    node.params.get(key).and_then(|v| v.as_u64()).unwrap_or(0)
}

pub fn estimate_work(program: &PhysicalProgram, hints: Option<&WorkHint>) -> Result<WorkEstimate> {
    let tiles = program.query.tile_grid()?.total() as u64;
    let duration = program.query.temporal.duration().max(0) as u64;
    let mut est = WorkEstimate {
        tiles_per_raster: tiles,
        ..WorkEstimate::default()
    };

    fn walk(
        n: &PhysicalNode,
        hints: Option<&WorkHint>,
        tiles: u64,
        duration: u64,
        est: &mut WorkEstimate,
    ) -> u64 {
        use OperatorKind::*;
        est.operators += 1;
        let inputs: Vec<u64> = n
            .inputs
            .iter()
            .map(|i| walk(i, hints, tiles, duration, est))
            .collect();
        let first = inputs.first().copied().unwrap_or(0);
        let rasters = match n.kind {
            Source => {
                let dataset = n.params.get("dataset").and_then(|v| v.as_str()).unwrap_or("");
                hints
                    .and_then(|h| h.source_rasters.iter().find(|(d, _)| d == dataset))
                    .map(|(_, r)| *r)
                    .unwrap_or(1)
            }
            Aggregator => match step_param(n, "bucket") {
                Some(step) => duration.div_ceil(step_seconds(&step)).max(1),
                None => 1,
            },
            Sampler => match step_param(n, "step") {
                Some(step) => duration.div_ceil(step_seconds(&step)),
                None => {
                    let skip = count_param(n, "skip") + 1;
                    first.div_ceil(skip) * (count_param(n, "repeat") + 1)
                }
            },
            TemporalOverlap => inputs.iter().copied().max().unwrap_or(0),
            OrderChanger => {
                if n.order == Order::TileMajor {
                    est.materialized_tiles += first * tiles;
                }
                first
            }
            CumulativeSum | Convolution | RasterCache | CacheSimulator => first,
        };
        est.descriptors += rasters * tiles;
        rasters
    }

    est.output_rasters = walk(&program.root, hints, tiles, duration, &mut est);
    Ok(est)
}
