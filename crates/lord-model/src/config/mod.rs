//! Typed configuration sections.
//!
//! Every section deserializes with defaults for missing fields, so a config
//! file only has to name what differs from the stock deployment.
mod env;
pub use env::{
    DirectorySourceConfig, EnvConfig, FileSourceConfig, ResolverConfig, VaultAuth, VaultMode,
    VaultSourceConfig,
};

mod mutex;
pub use mutex::{MutexConfig, RedisStoreConfig, StoreConfig};

mod runtime;
pub use runtime::{ExecConfig, ForkPoolConfig, PoolConfig, QueueConfig, SchedulerConfig, TenantConfig};

mod mode;
pub use mode::WorkerMode;
