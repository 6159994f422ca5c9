use dealflow_core::CoreError;
use dealflow_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Rejected before any store call.
    #[error("validation failed: {0}")]
    Validation(#[from] CoreError),

    #[error("could not save changes ({code}): {message}")]
    Persist { code: String, message: String },

    #[error("could not load opportunities ({code}): {message}")]
    Fetch { code: String, message: String },

    /// Local state does not hold the referenced card.
    #[error("opportunity not found: {0}")]
    NotFound(String),
}

impl PipelineError {
    pub fn persist(err: &StorageError) -> Self {
        Self::Persist {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn fetch(err: &StorageError) -> Self {
        Self::Fetch {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn unauthenticated_persist() -> Self {
        Self::Persist {
            code: "unauthenticated".into(),
            message: "no signed-in user".into(),
        }
    }

    pub(crate) fn unauthenticated_fetch() -> Self {
        Self::Fetch {
            code: "unauthenticated".into(),
            message: "no signed-in user".into(),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Validation(_) => "validation",
            Self::Persist { code, .. } | Self::Fetch { code, .. } => code,
            Self::NotFound(_) => "not_found",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid statuses: {0}")]
    Statuses(#[from] CoreError),

    #[error("store error: {0}")]
    Storage(#[from] StorageError),
}
