//! The fixed operator vocabulary of a query tree.
//!
//! The planner validates names and arity against `OperatorKind`; the operator
//! registry instantiates one implementation per kind.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tile::Order;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    Source,
    Aggregator,
    CumulativeSum,
    Convolution,
    TemporalOverlap,
    OrderChanger,
    Sampler,
    RasterCache,
    CacheSimulator,
}

const BOTH: &[Order] = &[Order::TileMajor, Order::TimeMajor];
const TILE_MAJOR: &[Order] = &[Order::TileMajor];
const TIME_MAJOR: &[Order] = &[Order::TimeMajor];

impl OperatorKind {
    pub const ALL: [OperatorKind; 9] = [
        OperatorKind::Source,
        OperatorKind::Aggregator,
        OperatorKind::CumulativeSum,
        OperatorKind::Convolution,
        OperatorKind::TemporalOverlap,
        OperatorKind::OrderChanger,
        OperatorKind::Sampler,
        OperatorKind::RasterCache,
        OperatorKind::CacheSimulator,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OperatorKind::Source => "source",
            OperatorKind::Aggregator => "aggregator",
            OperatorKind::CumulativeSum => "cumulative_sum",
            OperatorKind::Convolution => "convolution",
            OperatorKind::TemporalOverlap => "temporal_overlap",
            OperatorKind::OrderChanger => "order_changer",
            OperatorKind::Sampler => "sampler",
            OperatorKind::RasterCache => "raster_cache",
            OperatorKind::CacheSimulator => "cache_simulator",
        }
    }

    pub fn from_name(name: &str) -> Result<OperatorKind> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.name() == name)
            .ok_or_else(|| Error::UnknownOperator(name.to_string()))
    }

    /// Returns the number of inputs for this node.
    pub fn inputs(self) -> usize {
        use OperatorKind::*;
        match self {
            Source => 0,
            Aggregator | CumulativeSum | Convolution | OrderChanger | Sampler | RasterCache
            | CacheSimulator => 1,
            TemporalOverlap => 2,
        }
    }

    pub fn is_unary(self) -> bool {
        self.inputs() == 1
    }

    pub fn is_binary(self) -> bool {
        self.inputs() == 2
    }

    /// Orders this operator can emit without an order changer above its input.
    pub fn native_orders(self) -> &'static [Order] {
        use OperatorKind::*;
        match self {
            Aggregator => TILE_MAJOR,
            TemporalOverlap => TIME_MAJOR,
            Source | CumulativeSum | Convolution | OrderChanger | Sampler | RasterCache
            | CacheSimulator => BOTH,
        }
    }

    pub fn supports_order(self, order: Order) -> bool {
        self.native_orders().contains(&order)
    }
}

impl std::fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_and_unknown_names_fail() {
        for k in OperatorKind::ALL {
            assert_eq!(OperatorKind::from_name(k.name()).unwrap(), k);
        }
        let err = OperatorKind::from_name("resample").unwrap_err();
        assert!(matches!(err, Error::UnknownOperator(_)));
        assert!(err.is_config());
    }

    #[test]
    fn arity_and_orders() {
        assert_eq!(OperatorKind::Source.inputs(), 0);
        assert!(OperatorKind::TemporalOverlap.is_binary());
        assert!(!OperatorKind::Aggregator.supports_order(Order::TimeMajor));
        assert!(OperatorKind::OrderChanger.supports_order(Order::TimeMajor));
    }
}
