//! Multi-input operators.

pub mod overlap;

pub use overlap::{Combiner, TemporalOverlapOp, TemporalOverlapParams};
