//! HashiCorp Vault KV v2 resolver.
mod auth;

mod client;
pub use client::{Secret, VaultClient};

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use lord_model::{Environment, TenantKey, VaultMode, VaultSourceConfig};
use tracing::{info, warn};

use crate::{
    DirectoryReader, DirectoryWriter, EnvError, EnvResult,
    resolver::{Changes, EnvResolver, VarsPolicy, reconcile, write_env_file},
};

/// Tenants stored as secrets under `<storage>/<prefix>`.
///
/// In `multi` mode every secret under the prefix is a tenant. In `single`
/// mode only `key` is read, optionally mirrored into a dotenv file.
///
/// Once at least one environment has been loaded, backend outages only
/// skip sync attempts. Before that, they are configuration errors: the
/// process must not run without tenant state.
pub struct VaultResolver {
    client: VaultClient,
    prefix: String,
    mode: VaultMode,
    key: Option<String>,
    env_file: Option<PathBuf>,
    directory: DirectoryWriter,
    policy: VarsPolicy,
    loaded: AtomicBool,
}

impl VaultResolver {
    pub fn new(cfg: &VaultSourceConfig, directory: DirectoryWriter) -> EnvResult<Self> {
        cfg.validate()
            .map_err(|e| EnvError::Configuration(e.to_string()))?;
        Ok(Self {
            client: VaultClient::new(cfg)?,
            prefix: cfg.prefix.trim_matches('/').to_string(),
            mode: cfg.mode,
            key: cfg.key.clone(),
            env_file: cfg.env_file.clone(),
            directory,
            policy: VarsPolicy::default(),
            loaded: AtomicBool::new(false),
        })
    }

    pub fn with_policy(mut self, policy: VarsPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn secret_path(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{key}", self.prefix)
        }
    }

    fn single_key(&self) -> EnvResult<&str> {
        self.key
            .as_deref()
            .ok_or_else(|| EnvError::Configuration("vault single mode requires `key`".into()))
    }

    /// Turn a failed attempt into either a skipped tick or a fatal error.
    fn degrade(&self, err: EnvError) -> EnvResult<Changes> {
        if err.is_fatal() {
            return Err(err);
        }
        if self.loaded.load(Ordering::Acquire) {
            warn!(error = %err, "vault sync attempt failed, keeping current environments");
            return Ok(Changes::default());
        }
        Err(EnvError::Configuration(format!(
            "no environment could be loaded from vault: {err}"
        )))
    }

    async fn sync_single(&self) -> EnvResult<Changes> {
        let key = self.single_key()?;
        let Some(env) = self.load_secret(key, false).await? else {
            return Err(EnvError::Backend {
                key: key.to_string(),
                reason: "secret not found".into(),
            });
        };

        let changes = match self.directory.find(key).await {
            None => Changes {
                created: vec![key.to_string()],
                ..Default::default()
            },
            Some(current) if current.is_diff(&env) => Changes::updated(key),
            Some(_) => Changes::default(),
        };
        if !changes.is_empty() {
            if let Some(path) = &self.env_file {
                write_env_file(path, env.vars()).await?;
                info!(path = %path.display(), "env file updated from vault");
            }
            self.directory.store(env).await?;
        }
        Ok(changes)
    }
}

#[async_trait]
impl EnvResolver for VaultResolver {
    fn name(&self) -> &'static str {
        "vault"
    }

    async fn boot(&self) -> EnvResult<bool> {
        let changes = self.sync_once().await?;
        if !self.loaded.load(Ordering::Acquire) {
            return Err(EnvError::Configuration(
                "vault returned no environments".to_string(),
            ));
        }
        info!(mode = ?self.mode, tenants = changes.created.len(), "vault environments loaded");
        Ok(true)
    }

    async fn list_secrets(&self) -> EnvResult<Vec<TenantKey>> {
        match self.mode {
            VaultMode::Single => Ok(Vec::new()),
            VaultMode::Multi => self.client.list(&self.prefix).await,
        }
    }

    async fn load_secret(&self, key: &str, quiet: bool) -> EnvResult<Option<Environment>> {
        match self.client.read(&self.secret_path(key)).await {
            Ok(secret) => Ok(Some(self.policy.apply(Environment::new(
                key,
                secret.vars,
                secret.version,
                secret.created_at,
            )))),
            Err(e) if quiet => {
                warn!(tenant = %key, error = %e, "cannot load vault secret");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn sync_once(&self) -> EnvResult<Changes> {
        let result = match self.mode {
            VaultMode::Multi => reconcile(self, &self.directory).await,
            VaultMode::Single => self.sync_single().await,
        };
        match result {
            Ok(changes) => {
                if !self.directory.keys().await.is_empty() {
                    self.loaded.store(true, Ordering::Release);
                }
                Ok(changes)
            }
            Err(e) => self.degrade(e),
        }
    }

    fn reader(&self) -> DirectoryReader {
        self.directory.reader()
    }

    async fn environment(&self) -> Option<Arc<Environment>> {
        match (self.mode, self.key.as_deref()) {
            (VaultMode::Single, Some(key)) => self.directory.find(key).await,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use lord_model::VaultAuth;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method, path},
    };

    use super::*;
    use crate::Directory;

    fn multi(server: &MockServer) -> VaultSourceConfig {
        VaultSourceConfig {
            addr: server.uri(),
            storage: "secret".into(),
            prefix: "tenants".into(),
            auth: VaultAuth::Token {
                token: "s.root".into(),
            },
            ..Default::default()
        }
    }

    fn secret(version: u64, created: &str, data: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "data": data,
                "metadata": { "version": version, "created_time": created }
            }
        }))
    }

    async fn mount_list(server: &MockServer, keys: &[&str]) {
        Mock::given(method("LIST"))
            .and(path("/v1/secret/metadata/tenants"))
            .and(header("X-Vault-Token", "s.root"))
            .and(header("X-Vault-Request", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"keys": keys}})))
            .mount(server)
            .await;
    }

    async fn mount_secret(server: &MockServer, key: &str, version: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/secret/data/tenants/{key}")))
            .respond_with(secret(
                version,
                "2024-05-01T10:00:00.000000Z",
                json!({"APP_NAME": key, "DB_PORT": 5432}),
            ))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn multi_mode_reconciles_listing() {
        let server = MockServer::start().await;
        mount_list(&server, &["acme", "globex", "archive/"]).await;
        mount_secret(&server, "acme", 1).await;
        mount_secret(&server, "globex", 1).await;

        let (writer, reader) = Directory::spawn(8);
        let resolver = VaultResolver::new(&multi(&server), writer).unwrap();
        assert!(resolver.boot().await.unwrap());

        assert_eq!(reader.keys().await, vec!["acme", "globex"]);
        let acme = reader.find("acme").await.unwrap();
        assert_eq!(acme.vars().get("APP_NAME"), Some("acme"));
        assert_eq!(acme.vars().get("DB_PORT"), Some("5432"));
        assert_eq!(acme.vars().get("TENANT_ID"), Some("acme"));
        assert_eq!(acme.version(), 1);

        server.reset().await;
        mount_list(&server, &["acme"]).await;
        mount_secret(&server, "acme", 2).await;

        let changes = resolver.sync_once().await.unwrap();
        assert_eq!(changes.updated, vec!["acme"]);
        assert_eq!(changes.removed, vec!["globex"]);
    }

    #[tokio::test]
    async fn outage_after_boot_skips_the_tick() {
        let server = MockServer::start().await;
        mount_list(&server, &["acme"]).await;
        mount_secret(&server, "acme", 1).await;

        let (writer, reader) = Directory::spawn(8);
        let resolver = VaultResolver::new(&multi(&server), writer).unwrap();
        resolver.boot().await.unwrap();

        server.reset().await;
        Mock::given(method("LIST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(resolver.sync_once().await.unwrap().is_empty());
        assert_eq!(reader.keys().await, vec!["acme"]);
    }

    #[tokio::test]
    async fn missing_listing_after_boot_keeps_tenants() {
        let server = MockServer::start().await;
        mount_list(&server, &["acme", "globex"]).await;
        mount_secret(&server, "acme", 1).await;
        mount_secret(&server, "globex", 1).await;

        let (writer, reader) = Directory::spawn(8);
        let resolver = VaultResolver::new(&multi(&server), writer).unwrap();
        resolver.boot().await.unwrap();

        server.reset().await;
        Mock::given(method("LIST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let changes = resolver.sync_once().await.unwrap();
        assert!(changes.removed.is_empty());
        assert_eq!(reader.keys().await, vec!["acme", "globex"]);
    }

    #[tokio::test]
    async fn outage_before_any_load_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("LIST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (writer, _) = Directory::spawn(8);
        let resolver = VaultResolver::new(&multi(&server), writer).unwrap();
        let err = resolver.boot().await.unwrap_err();
        assert!(matches!(err, EnvError::Configuration(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn single_mode_mirrors_env_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/apps/main"))
            .respond_with(secret(
                7,
                "2024-05-01T10:00:00Z",
                json!({"APP_KEY": "base64:abc", "DEBUG": false}),
            ))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join("app/.env");
        let cfg = VaultSourceConfig {
            prefix: "apps".into(),
            mode: VaultMode::Single,
            key: Some("main".into()),
            env_file: Some(env_file.clone()),
            ..multi(&server)
        };

        let (writer, _) = Directory::spawn(8);
        let resolver = VaultResolver::new(&cfg, writer).unwrap();
        resolver.boot().await.unwrap();

        let env = resolver.environment().await.unwrap();
        assert_eq!(env.version(), 7);
        assert_eq!(env.vars().get("DEBUG"), Some("false"));
        assert!(resolver.list_secrets().await.unwrap().is_empty());

        let written = std::fs::read_to_string(&env_file).unwrap();
        assert!(written.contains("APP_KEY=\"base64:abc\""));

        // same version again: nothing to report
        assert!(resolver.sync_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn kubernetes_login_supplies_the_token() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let jwt_path = dir.path().join("token");
        std::fs::write(&jwt_path, "sa.jwt.value\n").unwrap();

        Mock::given(method("POST"))
            .and(path("/v1/auth/k8s/login"))
            .and(body_json(json!({"jwt": "sa.jwt.value", "role": "laralord"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "auth": {"client_token": "s.leased", "lease_duration": 3600}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("LIST"))
            .and(path("/v1/secret/metadata/tenants"))
            .and(header("X-Vault-Token", "s.leased"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"keys": ["acme"]}})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/tenants/acme"))
            .and(header("X-Vault-Token", "s.leased"))
            .respond_with(secret(1, "2024-05-01T10:00:00Z", json!({"A": "1"})))
            .mount(&server)
            .await;

        let cfg = VaultSourceConfig {
            auth: VaultAuth::Kubernetes {
                role: "laralord".into(),
                endpoint: "k8s".into(),
                jwt_path,
            },
            ..multi(&server)
        };
        let (writer, reader) = Directory::spawn(8);
        let resolver = VaultResolver::new(&cfg, writer).unwrap();
        resolver.boot().await.unwrap();
        resolver.sync_once().await.unwrap();

        assert_eq!(reader.keys().await, vec!["acme"]);
    }
}
