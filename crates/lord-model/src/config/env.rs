use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ModelError, ModelResult, Vars};

/// Environment source section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Backend the tenant environments are resolved from.
    pub resolver: ResolverConfig,
    /// Variables shared by every tenant; tenant values win on conflict.
    pub common: Vars,
    /// Variable names stripped from every resolved environment.
    pub exclude: Vec<String>,
    /// Resync period in seconds, `0` disables periodic reconciliation.
    pub sync_period_secs: u64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            common: Vars::new(),
            exclude: Vec::new(),
            sync_period_secs: 30,
        }
    }
}

/// Resolver selection, tagged by `source`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum ResolverConfig {
    File(FileSourceConfig),
    Directory(DirectorySourceConfig),
    Vault(VaultSourceConfig),
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig::File(FileSourceConfig::default())
    }
}

impl ResolverConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ResolverConfig::File(_) => "file",
            ResolverConfig::Directory(_) => "directory",
            ResolverConfig::Vault(_) => "vault",
        }
    }

    pub fn validate(&self) -> ModelResult<()> {
        match self {
            ResolverConfig::File(c) if c.path.as_os_str().is_empty() => {
                Err(ModelError::Invalid("file source path is empty".into()))
            }
            ResolverConfig::Directory(c) if c.path.as_os_str().is_empty() => {
                Err(ModelError::Invalid("directory source path is empty".into()))
            }
            ResolverConfig::Vault(c) => c.validate(),
            _ => Ok(()),
        }
    }
}

/// Single tenant read from one dotenv file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSourceConfig {
    pub path: PathBuf,
}

impl Default for FileSourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".env"),
        }
    }
}

/// One tenant per `.env.<key>` file inside `path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorySourceConfig {
    pub path: PathBuf,
}

impl Default for DirectorySourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".envs"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultMode {
    /// One secret, addressed by `key`.
    Single,
    /// Every secret listed under `prefix` is a tenant.
    #[default]
    Multi,
}

/// How the resolver obtains its Vault token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum VaultAuth {
    /// Static token.
    Token { token: String },
    /// Exchange the pod service-account JWT for a leased token.
    Kubernetes {
        role: String,
        #[serde(default = "default_k8s_endpoint")]
        endpoint: String,
        #[serde(default = "default_k8s_jwt_path")]
        jwt_path: PathBuf,
    },
}

fn default_k8s_endpoint() -> String {
    "kubernetes".to_string()
}

fn default_k8s_jwt_path() -> PathBuf {
    PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/token")
}

impl Default for VaultAuth {
    fn default() -> Self {
        VaultAuth::Token {
            token: String::new(),
        }
    }
}

/// HashiCorp Vault KV v2 source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultSourceConfig {
    /// Base address, e.g. `https://vault.internal:8200`.
    pub addr: String,
    /// KV mount name.
    pub storage: String,
    /// Path under the mount holding tenant secrets.
    pub prefix: String,
    pub mode: VaultMode,
    /// Secret name in `single` mode.
    pub key: Option<String>,
    pub auth: VaultAuth,
    /// Mirror the single-tenant secret into this dotenv file.
    pub env_file: Option<PathBuf>,
    /// HTTP request timeout.
    pub timeout_ms: u64,
}

impl Default for VaultSourceConfig {
    fn default() -> Self {
        Self {
            addr: "http://127.0.0.1:8200".to_string(),
            storage: "secret".to_string(),
            prefix: String::new(),
            mode: VaultMode::default(),
            key: None,
            auth: VaultAuth::default(),
            env_file: None,
            timeout_ms: 10_000,
        }
    }
}

impl VaultSourceConfig {
    pub fn validate(&self) -> ModelResult<()> {
        if self.addr.trim().is_empty() {
            return Err(ModelError::Invalid("vault addr is empty".into()));
        }
        if self.storage.trim().is_empty() {
            return Err(ModelError::Invalid("vault storage is empty".into()));
        }
        if self.mode == VaultMode::Single && self.key.as_deref().is_none_or(str::is_empty) {
            return Err(ModelError::Invalid("vault single mode requires `key`".into()));
        }
        match &self.auth {
            VaultAuth::Token { token } if token.is_empty() => {
                Err(ModelError::Invalid("vault token is empty".into()))
            }
            VaultAuth::Kubernetes { role, .. } if role.is_empty() => {
                Err(ModelError::Invalid("vault kubernetes role is empty".into()))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_is_tagged_by_source() {
        let json = r#"{"source":"directory","path":"/srv/envs"}"#;
        let cfg: ResolverConfig = serde_json::from_str(json).unwrap();
        match cfg {
            ResolverConfig::Directory(c) => assert_eq!(c.path, PathBuf::from("/srv/envs")),
            other => panic!("unexpected resolver: {other:?}"),
        }
    }

    #[test]
    fn vault_defaults_fill_missing_fields() {
        let json = r#"{"source":"vault","prefix":"tenants","auth":{"method":"token","token":"s.x"}}"#;
        let cfg: ResolverConfig = serde_json::from_str(json).unwrap();
        let ResolverConfig::Vault(v) = cfg else {
            panic!("expected vault");
        };
        assert_eq!(v.storage, "secret");
        assert_eq!(v.mode, VaultMode::Multi);
        assert!(v.validate().is_ok());
    }

    #[test]
    fn kubernetes_auth_defaults() {
        let json = r#"{"method":"kubernetes","role":"laralord"}"#;
        let auth: VaultAuth = serde_json::from_str(json).unwrap();
        match auth {
            VaultAuth::Kubernetes { endpoint, jwt_path, .. } => {
                assert_eq!(endpoint, "kubernetes");
                assert!(jwt_path.ends_with("serviceaccount/token"));
            }
            other => panic!("unexpected auth: {other:?}"),
        }
    }

    #[test]
    fn single_mode_requires_key() {
        let cfg = VaultSourceConfig {
            mode: VaultMode::Single,
            auth: VaultAuth::Token { token: "t".into() },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = VaultSourceConfig {
            key: Some("app".into()),
            ..cfg
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_config_defaults() {
        let cfg: EnvConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.resolver.kind(), "file");
        assert_eq!(cfg.sync_period_secs, 30);
        assert!(cfg.common.is_empty());
    }
}
