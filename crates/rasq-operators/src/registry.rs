//! Operator registry: one constructor per `OperatorKind`.
//!
//! Parameters arrive as JSON values (the planner converts the YAML params
//! map); each operator deserializes its own typed params struct.

use serde::de::DeserializeOwned;

use rasq_core::config::EngineConfig;
use rasq_core::dag::OperatorKind;
use rasq_core::error::{Error, Result};
use rasq_core::query::QueryRectangle;

use crate::aggregate::{AggregatorOp, AggregatorParams};
use crate::backend::BackendProvider;
use crate::cache::{CacheParams, RasterCacheOp};
use crate::convolution::{ConvolutionOp, ConvolutionParams};
use crate::cumulative::{CumulativeSumOp, CumulativeSumParams};
use crate::join::overlap::{TemporalOverlapOp, TemporalOverlapParams};
use crate::order::{OrderChangerOp, OrderChangerParams};
use crate::sampler::{SamplerOp, SamplerParams};
use crate::source::{SourceOp, SourceParams};
use crate::traits::BoxedOperator;

/// What constructors need besides params and inputs.
pub struct BuildContext<'a> {
    pub backends: &'a dyn BackendProvider,
    pub config: &'a EngineConfig,
}

pub fn parse_params<T: DeserializeOwned>(kind: OperatorKind, params: &serde_json::Value) -> Result<T> {
    let value = if params.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        params.clone()
    };
    serde_json::from_value(value)
        .map_err(|e| Error::Config(format!("invalid params for {kind}: {e}")))
}

/// Instantiate one (uninitialized) operator over already-built inputs.
pub fn instantiate(
    kind: OperatorKind,
    params: &serde_json::Value,
    query: QueryRectangle,
    inputs: Vec<BoxedOperator>,
    ctx: &BuildContext<'_>,
) -> Result<BoxedOperator> {
    if inputs.len() != kind.inputs() {
        return Err(Error::Config(format!(
            "{kind} takes {} input(s), got {}",
            kind.inputs(),
            inputs.len()
        )));
    }
    let mut inputs = inputs.into_iter();
    let mut next_input = || {
        inputs
            .next()
            .ok_or_else(|| Error::Config(format!("{kind} is missing an input")))
    };

    let op: BoxedOperator = match kind {
        OperatorKind::Source => {
            let p: SourceParams = parse_params(kind, params)?;
            let backend = ctx.backends.backend(&p.dataset)?;
            Box::new(SourceOp::new(query, backend))
        }
        OperatorKind::Aggregator => {
            let p: AggregatorParams = parse_params(kind, params)?;
            Box::new(AggregatorOp::new(query, p, next_input()?))
        }
        OperatorKind::CumulativeSum => {
            let p: CumulativeSumParams = parse_params(kind, params)?;
            Box::new(CumulativeSumOp::new(query, p, next_input()?))
        }
        OperatorKind::Convolution => {
            let p: ConvolutionParams = parse_params(kind, params)?;
            Box::new(ConvolutionOp::new(query, p, next_input()?))
        }
        OperatorKind::TemporalOverlap => {
            let p: TemporalOverlapParams = parse_params(kind, params)?;
            let left = next_input()?;
            let right = next_input()?;
            Box::new(TemporalOverlapOp::new(query, p, left, right))
        }
        OperatorKind::OrderChanger => {
            let mut p: OrderChangerParams = parse_params(kind, params)?;
            p.max_materialized_tiles
                .get_or_insert(ctx.config.max_materialized_tiles);
            Box::new(OrderChangerOp::new(query, p, next_input()?))
        }
        OperatorKind::Sampler => {
            let p: SamplerParams = parse_params(kind, params)?;
            Box::new(SamplerOp::new(query, p, next_input()?))
        }
        OperatorKind::RasterCache => {
            let _: CacheParams = parse_params(kind, params)?;
            Box::new(RasterCacheOp::new(query, next_input()?))
        }
        OperatorKind::CacheSimulator => {
            let _: CacheParams = parse_params(kind, params)?;
            Box::new(RasterCacheOp::simulator(query, next_input()?))
        }
    };
    Ok(op)
}
