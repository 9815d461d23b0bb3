#![forbid(unsafe_code)]
//! rasq-io: concrete dataset backends.
//!
//! Everything here implements `rasq_operators::Backend`; source operators
//! reach backends only through the [`Catalog`].

pub mod catalog;
pub mod grid;
pub mod handle_cache;
pub mod memory;
pub mod readers;
pub mod synthetic;

pub use catalog::{Catalog, DatasetSpec, InlineRaster};
pub use grid::DatasetGrid;
pub use handle_cache::{HandleCache, HandleCacheStats};
pub use memory::MemoryBackend;
pub use readers::json::{write_dataset, JsonRasterBackend};
pub use synthetic::{Pattern, SyntheticBackend};
