use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use lord_model::{Environment, TenantKey};
use tracing::{debug, warn};

use crate::{
    DirectoryReader, DirectoryWriter, EnvResult,
    resolver::{Changes, EnvResolver, VarsPolicy, parse_env_file},
};

/// Single tenant backed by one dotenv file, keyed by the file path.
///
/// A missing file is not fatal: the tenant runs with an empty environment
/// until the file appears.
pub struct FileResolver {
    path: PathBuf,
    key: TenantKey,
    directory: DirectoryWriter,
    policy: VarsPolicy,
}

impl FileResolver {
    pub fn new(path: impl AsRef<Path>, directory: DirectoryWriter) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            key: path.display().to_string(),
            path,
            directory,
            policy: VarsPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: VarsPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    async fn load(&self) -> EnvResult<Environment> {
        if !tokio::fs::try_exists(&self.path).await? {
            warn!(path = %self.path.display(), "env file not found, using an empty environment");
            return Ok(self.policy.apply(Environment::empty(&self.key)));
        }
        let (vars, modified) = parse_env_file(&self.path).await?;
        Ok(self.policy.apply(Environment::new(&self.key, vars, 0, modified)))
    }
}

#[async_trait]
impl EnvResolver for FileResolver {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn boot(&self) -> EnvResult<bool> {
        let env = self.load().await?;
        debug!(path = %self.path.display(), vars = env.vars().len(), "env file loaded");
        self.directory.store(env).await?;
        Ok(true)
    }

    async fn list_secrets(&self) -> EnvResult<Vec<TenantKey>> {
        Ok(Vec::new())
    }

    async fn load_secret(&self, key: &str, quiet: bool) -> EnvResult<Option<Environment>> {
        if key != self.key {
            return Ok(None);
        }
        match self.load().await {
            Ok(env) => Ok(Some(env)),
            Err(e) if quiet => {
                warn!(path = %self.path.display(), error = %e, "cannot load env file");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn sync_once(&self) -> EnvResult<Changes> {
        let env = self.load().await?;
        let changed = match self.directory.find(&self.key).await {
            Some(current) => current.is_diff(&env),
            None => true,
        };
        if !changed {
            return Ok(Changes::default());
        }
        self.directory.store(env).await?;
        Ok(Changes::updated(self.key.clone()))
    }

    fn reader(&self) -> DirectoryReader {
        self.directory.reader()
    }

    async fn environment(&self) -> Option<Arc<Environment>> {
        self.directory.find(&self.key).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::Directory;

    fn touch(path: &Path, at: SystemTime) {
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(at)
            .unwrap();
    }

    #[tokio::test]
    async fn boot_stores_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "APP_NAME=acme\n").unwrap();

        let (writer, _) = Directory::spawn(4);
        let resolver = FileResolver::new(&path, writer);
        assert!(resolver.boot().await.unwrap());

        let env = resolver.environment().await.unwrap();
        assert_eq!(env.key(), path.display().to_string());
        assert_eq!(env.vars().get("APP_NAME"), Some("acme"));
        assert_eq!(env.version(), 0);
        assert!(resolver.list_secrets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_file_yields_empty_environment() {
        let dir = tempfile::tempdir().unwrap();
        let (writer, _) = Directory::spawn(4);
        let resolver = FileResolver::new(dir.path().join("absent.env"), writer);

        assert!(resolver.boot().await.unwrap());
        let env = resolver.environment().await.unwrap();
        assert!(env.vars().is_empty());
    }

    #[tokio::test]
    async fn sync_detects_mtime_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "A=1\n").unwrap();
        touch(&path, SystemTime::now() - Duration::from_secs(60));

        let (writer, _) = Directory::spawn(4);
        let resolver = FileResolver::new(&path, writer);
        resolver.boot().await.unwrap();
        assert!(resolver.sync_once().await.unwrap().is_empty());

        std::fs::write(&path, "A=2\n").unwrap();
        touch(&path, SystemTime::now());

        let changes = resolver.sync_once().await.unwrap();
        assert_eq!(changes.updated, vec![resolver.key().to_string()]);
        let env = resolver.environment().await.unwrap();
        assert_eq!(env.vars().get("A"), Some("2"));
    }

    #[tokio::test]
    async fn policy_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "A=1\nSECRET=x\n").unwrap();

        let (writer, _) = Directory::spawn(4);
        let policy = VarsPolicy {
            common: lord_model::Vars::single("APP_ENV", "production"),
            exclude: vec!["SECRET".into()],
        };
        let resolver = FileResolver::new(&path, writer).with_policy(policy);
        resolver.boot().await.unwrap();

        let env = resolver.environment().await.unwrap();
        assert_eq!(env.vars().get("APP_ENV"), Some("production"));
        assert!(env.vars().get("SECRET").is_none());
    }
}
