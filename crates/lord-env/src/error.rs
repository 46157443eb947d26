use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("environment directory is not running")]
    Uninitialized,

    #[error("environment directory is full ({capacity} rows)")]
    CapacityExceeded { capacity: usize },
}

#[derive(Debug, Error)]
pub enum EnvError {
    /// The configured source does not exist. Fatal at boot.
    #[error("{0}")]
    SourceNotFound(String),

    /// The resolver cannot produce any tenant state. Fatal.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// One secret could not be fetched.
    #[error("backend error for '{key}': {reason}")]
    Backend { key: String, reason: String },

    /// One secret was fetched but is malformed.
    #[error("cannot parse secret '{key}': {reason}")]
    Parse { key: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl EnvError {
    /// Errors that must stop the process instead of being retried on the next tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EnvError::Configuration(_) | EnvError::Directory(_))
    }
}

pub type EnvResult<T> = Result<T, EnvError>;
