use serde::{Deserialize, Serialize};

use crate::Millis;

/// Distributed mutex section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MutexConfig {
    /// Namespace prepended to every key as `<prefix>:<key>`.
    pub prefix: String,
    /// TTL of one counting-semaphore slot.
    pub slot_ttl_ms: Millis,
    /// Minimal interval between two refreshes of the same slot.
    pub refresh_ms: Millis,
    pub store: StoreConfig,
}

impl Default for MutexConfig {
    fn default() -> Self {
        Self {
            prefix: "laralord-mutex".to_string(),
            slot_ttl_ms: 2_000,
            refresh_ms: 1_000,
            store: StoreConfig::default(),
        }
    }
}

/// Backing store, tagged by `kind`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process-local store; admission is only exclusive within one host.
    #[default]
    Memory,
    Redis(RedisStoreConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisStoreConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: u32,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            username: None,
            password: None,
            database: 0,
        }
    }
}

impl RedisStoreConfig {
    /// Connection URL in the `redis://[user[:pass]@]host:port/db` form.
    pub fn url(&self) -> String {
        let auth = match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!("{user}:{pass}@"),
            (None, Some(pass)) => format!(":{pass}@"),
            (Some(user), None) => format!("{user}@"),
            (None, None) => String::new(),
        };
        format!("redis://{auth}{}:{}/{}", self.host, self.port, self.database)
    }
}
