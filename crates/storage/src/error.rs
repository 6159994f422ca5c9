use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("core error: {0}")]
    Core(#[from] dealflow_core::CoreError),
}

impl StorageError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::Serialization(_) => "serialization",
            Self::NotFound(_) => "not_found",
            Self::AccessDenied(_) => "access_denied",
            Self::ConstraintViolation(_) => "constraint_violation",
            Self::Unavailable(_) => "unavailable",
            Self::Core(_) => "invalid_data",
        }
    }
}
