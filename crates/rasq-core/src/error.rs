use thiserror::Error;

/// Canonical result for core and operators.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Malformed or missing query parameters, wrong input arity.
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unknown operator '{0}'")]
    UnknownOperator(String),

    /// Operation invoked out of the allowed lifecycle order.
    #[error("Invalid operator state: {0}")]
    State(String),

    /// A requested point or tile falls outside the raster's extent.
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// Derived invariants violated.
    #[error("Internal invariant failed: {0}")]
    Consistency(String),

    // Backends map their I/O and decoding errors into this variant; the
    // core treats it as opaque.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl Error {
    /// True for the configuration category (including unknown operators).
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_) | Error::UnknownOperator(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}
