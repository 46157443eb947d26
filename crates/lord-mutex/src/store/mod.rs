use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use lord_model::StoreConfig;

use crate::StoreResult;

mod memory;
pub use memory::MemoryStore;

mod redis_store;
pub use redis_store::RedisStore;

/// Key/value store with per-key TTL.
///
/// Keys passed in are already namespaced by the caller.
#[async_trait]
pub trait MutexStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Create `key` with a TTL unless it exists. Returns whether it was created.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Atomically: if fewer than `max` live keys start with `prefix`,
    /// create `prefix + id` with a TTL and return `true`.
    async fn append_bounded(
        &self,
        prefix: &str,
        max: u32,
        id: &str,
        value: &str,
        ttl: Duration,
    ) -> StoreResult<bool>;

    /// Reset the TTL of an existing key. Returns `false` if the key is gone.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Number of live keys starting with `prefix`.
    async fn count(&self, prefix: &str) -> StoreResult<usize>;

    /// Drop the current connection and open a new one.
    async fn reconnect(&self) -> StoreResult<()>;
}

/// Build the store selected by `cfg`.
pub fn build_store(cfg: &StoreConfig) -> StoreResult<Arc<dyn MutexStore>> {
    Ok(match cfg {
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
        StoreConfig::Redis(redis) => Arc::new(RedisStore::open(&redis.url())?),
    })
}
