use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown worker mode: {0}")]
    UnknownMode(String),

    #[error("invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
