#![forbid(unsafe_code)]
//! rasq-operators: pull-based tile operators.
//!
//! Design intent:
//! - Everything is synchronous and single-threaded; payloads are deferred
//!   computations evaluated only by whoever finally needs the pixels.
//! - Operators own their inputs (`Box<dyn Operator>`); replays get their own
//!   subtree through `reinstantiate`, so cursors are never shared.
//! - Shared, evaluate-once tiles (`SharedTile`) are the only place where
//!   cell storage is aliased.

pub mod backend;
pub mod descriptor;
pub mod registry;
pub mod traits;

pub mod aggregate;
pub mod cache;
pub mod convolution;
pub mod cumulative;
pub mod join;
pub mod order;
pub mod sampler;
pub mod source;

pub use backend::{Backend, BackendProvider, DatasetMetadata, TileRequest};
pub use cache::{CacheStats, SharedTile};
pub use descriptor::{Payload, TileDescriptor};
pub use registry::{instantiate, BuildContext};
pub use traits::{BoxedOperator, Cursor, OpState, Operator, Pull, SkipUnit};
