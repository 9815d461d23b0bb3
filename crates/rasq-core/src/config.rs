//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on the number of descriptors an order changer may
    /// materialize when converting a time-major stream to tile-major.
    pub max_materialized_tiles: usize,

    /// Maximum number of decoded dataset handles a file backend keeps open
    /// across calls (tile-major queries only).
    pub handle_cache_capacity: usize,

    /// Base directory for relative dataset paths.
    pub data_dir: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_materialized_tiles: 1 << 20,
            handle_cache_capacity: 64,
            data_dir: ".".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `RASQ_MAX_MATERIALIZED_TILES`: order changer materialization limit
    /// - `RASQ_HANDLE_CACHE_CAPACITY`: handle cache size for file backends
    /// - `RASQ_DATA_DIR`: base directory for dataset paths
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("RASQ_MAX_MATERIALIZED_TILES") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_materialized_tiles = v;
            }
        }

        if let Ok(s) = std::env::var("RASQ_HANDLE_CACHE_CAPACITY") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.handle_cache_capacity = v;
            }
        }

        if let Ok(s) = std::env::var("RASQ_DATA_DIR") {
            cfg.data_dir = s;
        }

        cfg
    }

    /// Resolve a dataset path against `data_dir` unless it is already absolute.
    pub fn resolve_path(&self, path: &str) -> std::path::PathBuf {
        let p = std::path::Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            std::path::Path::new(&self.data_dir).join(p)
        }
    }
}
