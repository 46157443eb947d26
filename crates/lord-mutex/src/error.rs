use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store is unreachable; worth one reconnect.
    #[error("store connection error: {0}")]
    Connection(String),

    /// The store answered with an error.
    #[error("store command error: {0}")]
    Command(String),
}

impl StoreError {
    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
