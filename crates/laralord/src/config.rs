use std::path::Path;

use anyhow::{Context, bail};
use serde::Deserialize;

use lord_model::{
    EnvConfig, ForkPoolConfig, MutexConfig, PoolConfig, QueueConfig, SchedulerConfig, TenantConfig,
};
use lord_observe::LogConfig;

/// Environment variable naming the config file when no path is given.
pub const CONFIG_ENV: &str = "LARALORD_CONFIG";

/// Top-level configuration file. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LaralordConfig {
    pub log: LogConfig,
    pub pool: PoolConfig,
    pub env: EnvConfig,
    pub mutex: MutexConfig,
    pub queue: QueueConfig,
    pub scheduler: SchedulerConfig,
    pub fork_pool: ForkPoolConfig,
    pub tenant: TenantConfig,
}

impl LaralordConfig {
    /// Read and validate `path`; defaults when there is no file.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        let cfg = Self::parse(&raw).with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let cfg: Self = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.pool.validate()?;
        self.env.resolver.validate()?;
        if self.fork_pool.max_forks == 0 {
            bail!("fork_pool.max_forks must be positive");
        }
        if self.queue.max_jobs == 0 {
            bail!("queue.max_jobs must be positive");
        }
        Ok(())
    }
}
