use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{Millis, ModelError, ModelResult};

/// Worker pool owned by one supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of workers started at boot.
    pub workers: u32,
    /// Supervisor housekeeping tick (message drain and worker reaping).
    pub tick_ms: Millis,
    /// Pause after a selection pass that admitted nothing.
    pub idle_sleep_ms: Millis,
    /// Child exit polling interval while a run is in flight.
    pub poll_ms: Millis,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            tick_ms: 100,
            idle_sleep_ms: 100,
            poll_ms: 50,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> ModelResult<()> {
        if self.workers == 0 {
            return Err(ModelError::Invalid("pool needs at least one worker".into()));
        }
        if self.tick_ms == 0 || self.poll_ms == 0 {
            return Err(ModelError::Invalid("pool intervals must be positive".into()));
        }
        Ok(())
    }
}

/// Command executed for one tenant run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Working directory; inherits the supervisor's when unset.
    pub cwd: Option<PathBuf>,
    /// Start children with the supervisor's environment (minus excluded keys).
    pub inherit_env: bool,
    /// Output lines longer than this are truncated before logging.
    pub max_line_length: usize,
}

impl ExecConfig {
    fn artisan(args: &[&str]) -> Self {
        Self {
            command: "php".to_string(),
            args: std::iter::once("artisan")
                .chain(args.iter().copied())
                .map(String::from)
                .collect(),
            cwd: None,
            inherit_env: true,
            max_line_length: 4096,
        }
    }
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self::artisan(&[])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Concurrent queue runs allowed per tenant across the fleet.
    pub max_jobs: u32,
    pub exec: ExecConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_jobs: 1,
            exec: ExecConfig::artisan(&["queue:work", "--once"]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// TTL of the per-tenant, per-minute lock.
    pub lock_ttl_secs: u64,
    /// Cycles running longer than this are reported as overruns.
    pub overrun_secs: u64,
    pub exec: ExecConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lock_ttl_secs: 70,
            overrun_secs: 60,
            exec: ExecConfig::artisan(&["schedule:run"]),
        }
    }
}

/// Request-side child table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForkPoolConfig {
    pub max_forks: usize,
    pub reap_period_ms: Millis,
    /// Attempts made while the table is full before rejecting.
    pub retries: u32,
    pub retry_delay_ms: Millis,
}

impl Default for ForkPoolConfig {
    fn default() -> Self {
        Self {
            max_forks: 32,
            reap_period_ms: 1_000,
            retries: 10,
            retry_delay_ms: 10,
        }
    }
}

/// Request to tenant mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantConfig {
    /// Comma separated resolver rules, tried in order.
    pub resolvers: String,
    /// Tenant used when no rule matches.
    pub fallback: Option<String>,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            resolvers: "header.TENANT-ID".to_string(),
            fallback: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_defaults_run_one_job_per_tenant() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.max_jobs, 1);
        assert_eq!(cfg.exec.command, "php");
        assert_eq!(cfg.exec.args, vec!["artisan", "queue:work", "--once"]);
    }

    #[test]
    fn scheduler_defaults() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.lock_ttl_secs, 70);
        assert_eq!(cfg.exec.args, vec!["artisan", "schedule:run"]);
    }

    #[test]
    fn pool_validation() {
        assert!(PoolConfig::default().validate().is_ok());
        let cfg = PoolConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_exec_section_keeps_defaults() {
        let cfg: ExecConfig = serde_json::from_str(r#"{"command":"/usr/bin/env"}"#).unwrap();
        assert_eq!(cfg.command, "/usr/bin/env");
        assert!(cfg.inherit_env);
        assert_eq!(cfg.max_line_length, 4096);
    }
}
