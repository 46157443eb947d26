mod domain;
pub use domain::{Environment, Millis, TENANT_ID_VAR, TenantKey, Vars, WORKER_ID_VAR, WorkerId};

mod error;
pub use error::{ModelError, ModelResult};

mod control;
pub use control::{ControlMessage, ReportAction, WorkerReport};

mod config;
pub use config::{
    DirectorySourceConfig, EnvConfig, ExecConfig, FileSourceConfig, ForkPoolConfig, MutexConfig,
    PoolConfig, QueueConfig, RedisStoreConfig, ResolverConfig, SchedulerConfig, StoreConfig,
    TenantConfig, VaultAuth, VaultMode, VaultSourceConfig, WorkerMode,
};
