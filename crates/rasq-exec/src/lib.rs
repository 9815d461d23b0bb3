#![forbid(unsafe_code)]
//! rasq-exec: operator tree construction, the pull runtime, terminal
//! consumers, deterministic replay and metrics.
//!
//! The runtime is single-threaded: it pulls the root operator until `End`,
//! evaluating each payload and handing the pixels to a `Consumer`.

pub mod consumer;
pub mod metrics;
pub mod replay;
pub mod runtime;
pub mod tree;

pub use consumer::{Collect, Consumer, Digest, Summary, TileSummary};
pub use runtime::{Engine, ExecError};
pub use tree::OperatorTree;
