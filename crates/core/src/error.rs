use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown status: {0}")]
    UnknownStatus(String),

    #[error("invalid status set: {0}")]
    InvalidStatusSet(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid data: {0}")]
    InvalidData(String),
}
