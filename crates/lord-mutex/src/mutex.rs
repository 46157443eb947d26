use std::{borrow::Cow, future::Future, sync::Arc, time::Duration};

use lord_model::MutexConfig;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{MutexStore, StoreResult, build_store};

/// Ownership of one counting-semaphore slot.
///
/// Returned by [`DistributedMutex::incr`]; hand it back to
/// [`DistributedMutex::decr`] when the guarded work is done.
#[derive(Debug, Clone)]
pub struct AdmissionToken {
    key: String,
    last_refresh: Instant,
    lost: bool,
}

impl AdmissionToken {
    /// Token for an existing sibling key, e.g. one recorded before a restart.
    pub fn for_sibling(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            last_refresh: Instant::now(),
            lost: false,
        }
    }

    /// Full store key of the slot.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The slot expired before it was refreshed; the cap is no longer guaranteed.
    pub fn is_lost(&self) -> bool {
        self.lost
    }
}

/// Percent-escape `:` (and `%` itself) so a key is one store segment.
fn key_segment(key: &str) -> Cow<'_, str> {
    if !key.contains([':', '%']) {
        return Cow::Borrowed(key);
    }
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

/// Exclusive lock and bounded counting semaphore over a [`MutexStore`].
///
/// Keys live under `<prefix>:`; semaphore slots under `<prefix>:<key>:<id>`.
/// The key segment is escaped, so `a:b` and `a` never share slots.
///
/// # Examples
/// ```
/// use std::sync::Arc;
///
/// use lord_model::MutexConfig;
/// use lord_mutex::{DistributedMutex, MemoryStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mutex = DistributedMutex::new(Arc::new(MemoryStore::new()), &MutexConfig::default());
///
/// let slot = mutex.incr("acme", 1, "worker-1").await.unwrap();
/// assert!(mutex.incr("acme", 1, "worker-2").await.is_none());
///
/// assert!(mutex.decr(&slot).await);
/// assert_eq!(mutex.live("acme").await, 0);
/// # }
/// ```
pub struct DistributedMutex {
    store: Arc<dyn MutexStore>,
    prefix: String,
    slot_ttl: Duration,
    refresh_every: Duration,
}

impl DistributedMutex {
    pub fn new(store: Arc<dyn MutexStore>, cfg: &MutexConfig) -> Self {
        Self {
            store,
            prefix: cfg.prefix.clone(),
            slot_ttl: Duration::from_millis(cfg.slot_ttl_ms),
            refresh_every: Duration::from_millis(cfg.refresh_ms),
        }
    }

    /// Build the configured store and wrap it.
    pub fn from_config(cfg: &MutexConfig) -> StoreResult<Self> {
        Ok(Self::new(build_store(&cfg.store)?, cfg))
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    fn lock_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key_segment(key))
    }

    fn sibling_prefix(&self, key: &str) -> String {
        format!("{}:{}:", self.prefix, key_segment(key))
    }

    /// Run `op`; on a connection error reconnect once and retry.
    /// Any remaining failure is logged and reported as `None`.
    async fn attempt<T, F, Fut>(&self, what: &'static str, op: F) -> Option<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let err = match op().await {
            Ok(v) => return Some(v),
            Err(e) => e,
        };
        if !err.is_connection() {
            warn!(op = what, store = self.store.name(), error = %err, "mutex operation failed");
            return None;
        }

        debug!(op = what, error = %err, "mutex store unreachable, reconnecting");
        if let Err(e) = self.store.reconnect().await {
            warn!(op = what, store = self.store.name(), error = %e, "mutex store reconnect failed");
            return None;
        }
        match op().await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(op = what, store = self.store.name(), error = %e, "mutex operation failed after reconnect");
                None
            }
        }
    }

    /// Take the exclusive lock on `key` for `ttl`.
    pub async fn lock(&self, key: &str, ttl: Duration, value: &str) -> bool {
        let full = self.lock_key(key);
        self.attempt("lock", || self.store.set_if_absent(&full, value, ttl))
            .await
            .unwrap_or(false)
    }

    /// Release the exclusive lock before its TTL.
    pub async fn unlock(&self, key: &str) -> bool {
        let full = self.lock_key(key);
        self.attempt("unlock", || self.store.delete(&full))
            .await
            .unwrap_or(false)
    }

    /// Take one of `max` slots for `key`.
    pub async fn incr(&self, key: &str, max: u32, value: &str) -> Option<AdmissionToken> {
        if max == 0 {
            return None;
        }
        let prefix = self.sibling_prefix(key);
        let id = Uuid::new_v4().simple().to_string();
        let admitted = self
            .attempt("incr", || {
                self.store
                    .append_bounded(&prefix, max, &id, value, self.slot_ttl)
            })
            .await
            .unwrap_or(false);

        admitted.then(|| AdmissionToken::for_sibling(format!("{prefix}{id}")))
    }

    /// Give a slot back. A token whose slot no longer exists is a no-op.
    pub async fn decr(&self, token: &AdmissionToken) -> bool {
        self.attempt("decr", || self.store.delete(&token.key))
            .await
            .unwrap_or(false)
    }

    /// Extend the slot TTL, at most once per refresh interval.
    ///
    /// Returns `false` once the slot is found expired; the token is then
    /// marked lost and further refreshes are skipped.
    pub async fn refresh(&self, token: &mut AdmissionToken) -> bool {
        if token.lost {
            return false;
        }
        let now = Instant::now();
        if now.duration_since(token.last_refresh) < self.refresh_every {
            return true;
        }
        let key = token.key.clone();
        let extended = self
            .attempt("refresh", || self.store.expire(&key, self.slot_ttl))
            .await;
        match extended {
            Some(true) => {
                token.last_refresh = now;
                true
            }
            Some(false) => {
                warn!(slot = %token.key, "admission slot expired before refresh");
                token.lost = true;
                false
            }
            // store unreachable: keep the token, the next refresh retries
            None => false,
        }
    }

    /// Live slots for `key`.
    pub async fn live(&self, key: &str) -> usize {
        let prefix = self.sibling_prefix(key);
        self.attempt("live", || self.store.count(&prefix))
            .await
            .unwrap_or(0)
    }
}
