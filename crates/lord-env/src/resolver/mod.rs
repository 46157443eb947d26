//! Environment resolvers.
//!
//! A resolver owns the [`DirectoryWriter`] and keeps the directory in line
//! with its backend. Multi-tenant resolvers share [`reconcile`]; single-tenant
//! ones store their one environment under a fixed key.
use std::{fmt, sync::Arc};

use async_trait::async_trait;
use lord_model::{EnvConfig, Environment, ResolverConfig, TenantKey, Vars};

use crate::{DirectoryReader, DirectoryWriter, EnvError, EnvResult};

mod dotenv;
pub use dotenv::{parse_env_file, write_env_file};

mod reconcile;
pub use reconcile::reconcile;

mod sync;
pub use sync::spawn_sync;

mod file;
pub use file::FileResolver;

mod directory;
pub use directory::DirectoryResolver;

pub mod vault;
pub use vault::VaultResolver;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    pub created: Vec<TenantKey>,
    pub updated: Vec<TenantKey>,
    pub removed: Vec<TenantKey>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    pub fn updated(key: impl Into<TenantKey>) -> Self {
        Self {
            updated: vec![key.into()],
            ..Default::default()
        }
    }
}

impl fmt::Display for Changes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created={} updated={} removed={}",
            self.created.len(),
            self.updated.len(),
            self.removed.len()
        )
    }
}

/// Variables added to and removed from every resolved environment.
#[derive(Debug, Clone, Default)]
pub struct VarsPolicy {
    pub common: Vars,
    pub exclude: Vec<String>,
}

impl VarsPolicy {
    pub fn apply(&self, env: Environment) -> Environment {
        if self.common.is_empty() && self.exclude.is_empty() {
            return env;
        }
        env.filtered(&self.common, &self.exclude)
    }
}

/// Source of tenant environments.
#[async_trait]
pub trait EnvResolver: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// First full load. Misconfigured sources fail here.
    async fn boot(&self) -> EnvResult<bool>;

    /// Tenant keys known to the backend. Empty for single-tenant sources.
    async fn list_secrets(&self) -> EnvResult<Vec<TenantKey>>;

    /// Load one tenant.
    ///
    /// With `quiet` set, backend and parse errors are logged and reported
    /// as `Ok(None)` so one broken secret cannot abort a batch.
    async fn load_secret(&self, key: &str, quiet: bool) -> EnvResult<Option<Environment>>;

    /// One reconciliation tick.
    async fn sync_once(&self) -> EnvResult<Changes>;

    /// Reader attached to the directory this resolver writes.
    fn reader(&self) -> DirectoryReader;

    /// The environment of a single-tenant source.
    async fn environment(&self) -> Option<Arc<Environment>> {
        None
    }
}

/// Build the resolver selected by `cfg` on top of `writer`.
pub fn build_resolver(cfg: &EnvConfig, writer: DirectoryWriter) -> EnvResult<Arc<dyn EnvResolver>> {
    cfg.resolver
        .validate()
        .map_err(|e| EnvError::Configuration(e.to_string()))?;

    let policy = VarsPolicy {
        common: cfg.common.clone(),
        exclude: cfg.exclude.clone(),
    };
    let resolver: Arc<dyn EnvResolver> = match &cfg.resolver {
        ResolverConfig::File(c) => Arc::new(FileResolver::new(&c.path, writer).with_policy(policy)),
        ResolverConfig::Directory(c) => {
            Arc::new(DirectoryResolver::new(&c.path, writer).with_policy(policy))
        }
        ResolverConfig::Vault(c) => Arc::new(VaultResolver::new(c, writer)?.with_policy(policy)),
    };
    Ok(resolver)
}

/// Values stored in a secret backend are not always strings.
pub(crate) fn secret_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
