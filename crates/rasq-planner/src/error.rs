use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid plan: {0}")]
    Invalid(String),

    #[error(transparent)]
    Core(#[from] rasq_core::Error),
}

impl PlanError {
    /// True when the failure is a configuration problem (bad names, arity,
    /// parameters, query rectangle) rather than malformed YAML.
    pub fn is_config(&self) -> bool {
        match self {
            PlanError::Core(e) => e.is_config(),
            PlanError::Invalid(_) => true,
            PlanError::Yaml(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PlanError>;
