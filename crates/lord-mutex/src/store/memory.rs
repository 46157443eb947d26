use std::{collections::HashMap, sync::Mutex, time::Duration};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::{StoreError, StoreResult, store::MutexStore};

/// Process-local store.
///
/// Every operation runs in one critical section, so `append_bounded` is
/// atomic with respect to concurrent tasks. Admission is exclusive only
/// within the process that owns the store.
#[derive(Default)]
pub struct MemoryStore {
    /// Key -> expiry. Values are owner hints only and are not kept.
    entries: Mutex<HashMap<String, Instant>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_live<T>(&self, f: impl FnOnce(&mut HashMap<String, Instant>) -> T) -> StoreResult<T> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Command("memory store poisoned".into()))?;
        let now = Instant::now();
        entries.retain(|_, expires_at| *expires_at > now);
        Ok(f(&mut entries))
    }
}

#[async_trait]
impl MutexStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn set_if_absent(&self, key: &str, _value: &str, ttl: Duration) -> StoreResult<bool> {
        self.with_live(|entries| {
            if entries.contains_key(key) {
                return false;
            }
            entries.insert(key.to_string(), Instant::now() + ttl);
            true
        })
    }

    async fn append_bounded(
        &self,
        prefix: &str,
        max: u32,
        id: &str,
        _value: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        self.with_live(|entries| {
            let live = entries.keys().filter(|k| k.starts_with(prefix)).count();
            if live >= max as usize {
                return false;
            }
            entries.insert(format!("{prefix}{id}"), Instant::now() + ttl);
            true
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.with_live(|entries| match entries.get_mut(key) {
            Some(expires_at) => {
                *expires_at = Instant::now() + ttl;
                true
            }
            None => false,
        })
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.with_live(|entries| entries.remove(key).is_some())
    }

    async fn count(&self, prefix: &str) -> StoreResult<usize> {
        self.with_live(|entries| entries.keys().filter(|k| k.starts_with(prefix)).count())
    }

    async fn reconnect(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn set_if_absent_respects_ttl() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(70);

        assert!(store.set_if_absent("lock:a", "w1", ttl).await.unwrap());
        assert!(!store.set_if_absent("lock:a", "w2", ttl).await.unwrap());

        tokio::time::advance(Duration::from_secs(71)).await;
        assert!(store.set_if_absent("lock:a", "w2", ttl).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn append_bounded_counts_live_siblings() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(2);

        assert!(store.append_bounded("sem:a:", 2, "1", "w", ttl).await.unwrap());
        assert!(store.append_bounded("sem:a:", 2, "2", "w", ttl).await.unwrap());
        assert!(!store.append_bounded("sem:a:", 2, "3", "w", ttl).await.unwrap());
        // other tenants are unaffected
        assert!(store.append_bounded("sem:ab:", 2, "1", "w", ttl).await.unwrap());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(store.count("sem:a:").await.unwrap(), 0);
        assert!(store.append_bounded("sem:a:", 2, "4", "w", ttl).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn expire_extends_only_existing_keys() {
        let store = MemoryStore::new();
        store
            .set_if_absent("k", "v", Duration::from_secs(2))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert!(store.expire("k", Duration::from_secs(2)).await.unwrap());
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(store.count("k").await.unwrap(), 1);

        assert!(!store.expire("missing", Duration::from_secs(2)).await.unwrap());
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }
}
