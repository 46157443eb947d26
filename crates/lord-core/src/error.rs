use thiserror::Error;

use lord_env::EnvError;
use lord_exec::ExecError;
use lord_model::ModelError;
use lord_mutex::StoreError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("environment error: {0}")]
    Env(#[from] EnvError),

    #[error("exec error: {0}")]
    Exec(#[from] ExecError),

    #[error("mutex store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid configuration: {0}")]
    Model(#[from] ModelError),

    #[error("tenant resolver error: {0}")]
    TenantResolver(String),

    #[error("supervisor error: {0}")]
    Supervisor(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
