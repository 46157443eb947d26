use std::time::Duration;

use lord_model::{Environment, Vars, VaultSourceConfig};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::trace;

use crate::{
    EnvError, EnvResult,
    resolver::{secret_value, vault::auth::TokenSource},
};

#[derive(Deserialize)]
struct ListResponse {
    data: ListData,
}

#[derive(Deserialize)]
struct ListData {
    #[serde(default)]
    keys: Vec<String>,
}

#[derive(Deserialize)]
struct ReadResponse {
    data: ReadData,
}

#[derive(Deserialize)]
struct ReadData {
    data: Option<Map<String, Value>>,
    metadata: SecretMetadata,
}

#[derive(Deserialize)]
struct SecretMetadata {
    version: u64,
    created_time: String,
}

/// One KV v2 secret.
#[derive(Debug, Clone)]
pub struct Secret {
    pub vars: Vars,
    pub version: u64,
    pub created_at: OffsetDateTime,
}

/// Minimal KV v2 client: `LIST metadata/<path>` and `GET data/<path>`.
pub struct VaultClient {
    http: reqwest::Client,
    addr: String,
    mount: String,
    auth: TokenSource,
}

impl VaultClient {
    pub fn new(cfg: &VaultSourceConfig) -> EnvResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| EnvError::Configuration(format!("vault http client: {e}")))?;
        Ok(Self {
            http,
            addr: cfg.addr.trim_end_matches('/').to_string(),
            mount: cfg.storage.trim_matches('/').to_string(),
            auth: TokenSource::from_config(&cfg.auth),
        })
    }

    fn url(&self, kind: &str, path: &str) -> String {
        format!("{}/v1/{}/{kind}/{}", self.addr, self.mount, path.trim_matches('/'))
    }

    async fn request(&self, method: Method, url: &str, key: &str) -> EnvResult<reqwest::Response> {
        let token = self.auth.token(&self.http, &self.addr).await?;
        trace!(%method, %url, "vault request");
        self.http
            .request(method, url)
            .header("X-Vault-Request", "true")
            .header("X-Vault-Token", token)
            .send()
            .await
            .map_err(|e| EnvError::Backend {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    /// Secret names directly under `path`; sub-folders (`name/`) are skipped.
    pub async fn list(&self, path: &str) -> EnvResult<Vec<String>> {
        let method = Method::from_bytes(b"LIST").map_err(|e| EnvError::Configuration(e.to_string()))?;
        let resp = self.request(method, &self.url("metadata", path), path).await?;
        // A missing listing is an error, never an authoritatively empty backend.
        if !resp.status().is_success() {
            return Err(EnvError::Backend {
                key: path.to_string(),
                reason: format!("list returned {}", resp.status()),
            });
        }
        let body: ListResponse = resp.json().await.map_err(|e| EnvError::Parse {
            key: path.to_string(),
            reason: e.to_string(),
        })?;
        Ok(body
            .data
            .keys
            .into_iter()
            .filter(|k| !k.ends_with('/'))
            .collect())
    }

    /// Latest version of the secret at `path`.
    pub async fn read(&self, path: &str) -> EnvResult<Secret> {
        let resp = self.request(Method::GET, &self.url("data", path), path).await?;
        if !resp.status().is_success() {
            return Err(EnvError::Backend {
                key: path.to_string(),
                reason: format!("read returned {}", resp.status()),
            });
        }
        let parse_err = |reason: String| EnvError::Parse {
            key: path.to_string(),
            reason,
        };
        let body: ReadResponse = resp.json().await.map_err(|e| parse_err(e.to_string()))?;
        let data = body
            .data
            .data
            .ok_or_else(|| parse_err("secret has no data".to_string()))?;
        let created_at = Environment::parse_created_at(&body.data.metadata.created_time)
            .map_err(|e| parse_err(e.to_string()))?;

        Ok(Secret {
            vars: data.iter().map(|(k, v)| (k.clone(), secret_value(v))).collect(),
            version: body.data.metadata.version,
            created_at,
        })
    }
}
