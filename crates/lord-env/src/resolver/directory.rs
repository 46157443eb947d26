use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lord_model::{Environment, TenantKey};
use tracing::{debug, warn};

use crate::{
    DirectoryReader, DirectoryWriter, EnvError, EnvResult,
    resolver::{Changes, EnvResolver, VarsPolicy, parse_env_file, reconcile},
};

const FILE_PREFIX: &str = ".env.";

/// One tenant per `.env.<key>` file in a directory.
pub struct DirectoryResolver {
    root: PathBuf,
    directory: DirectoryWriter,
    policy: VarsPolicy,
}

impl DirectoryResolver {
    pub fn new(root: impl AsRef<Path>, directory: DirectoryWriter) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            directory,
            policy: VarsPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: VarsPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn secret_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{FILE_PREFIX}{key}"))
    }

    async fn ensure_root(&self) -> EnvResult<()> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(EnvError::SourceNotFound(format!(
                "Provided env source path {} is not a directory",
                self.root.display()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EnvError::SourceNotFound(
                format!("The env source directory {} not found", self.root.display()),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

/// Tenant key encoded in a file name, if the name is `.env.<key>`.
fn tenant_key(file_name: &str) -> Option<&str> {
    let key = file_name.strip_prefix(FILE_PREFIX)?;
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    valid.then_some(key)
}

#[async_trait]
impl EnvResolver for DirectoryResolver {
    fn name(&self) -> &'static str {
        "directory"
    }

    async fn boot(&self) -> EnvResult<bool> {
        self.ensure_root().await?;
        let changes = reconcile(self, &self.directory).await?;
        debug!(root = %self.root.display(), tenants = changes.created.len(), "env directory loaded");
        Ok(true)
    }

    async fn list_secrets(&self) -> EnvResult<Vec<TenantKey>> {
        self.ensure_root().await?;

        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            match tenant_key(name) {
                Some(key) => keys.push(key.to_string()),
                None if name.starts_with(FILE_PREFIX) => {
                    warn!(file = %name, "ignoring env file with an invalid tenant name");
                }
                None => {}
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn load_secret(&self, key: &str, quiet: bool) -> EnvResult<Option<Environment>> {
        match parse_env_file(&self.secret_path(key)).await {
            Ok((vars, modified)) => Ok(Some(
                self.policy.apply(Environment::new(key, vars, 0, modified)),
            )),
            Err(e) if quiet => {
                warn!(tenant = %key, error = %e, "cannot load tenant env file");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn sync_once(&self) -> EnvResult<Changes> {
        reconcile(self, &self.directory).await
    }

    fn reader(&self) -> DirectoryReader {
        self.directory.reader()
    }
}
