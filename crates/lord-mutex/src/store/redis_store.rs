use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, RedisError, Script, aio::MultiplexedConnection};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{StoreError, StoreResult, store::MutexStore};

/// Count the siblings matching ARGV[1]; below ARGV[2], create KEYS[1].
const APPEND_BOUNDED: &str = r#"
local live = #redis.call('KEYS', ARGV[1])
if live >= tonumber(ARGV[2]) then
    return 0
end
redis.call('SET', KEYS[1], ARGV[3], 'PX', ARGV[4])
return 1
"#;

/// Redis-backed store shared by every host of the fleet.
///
/// The connection is opened lazily and replaced on [`MutexStore::reconnect`].
pub struct RedisStore {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
    append: Script,
}

impl RedisStore {
    pub fn open(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(classify)?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
            append: Script::new(APPEND_BOUNDED),
        })
    }

    async fn connection(&self) -> StoreResult<MultiplexedConnection> {
        let mut slot = self.conn.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(classify)?;
        debug!("redis connection opened");
        *slot = Some(conn.clone());
        Ok(conn)
    }
}

fn classify(e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Command(e.to_string())
    }
}

fn millis(ttl: Duration) -> u64 {
    ttl.as_millis().max(1) as u64
}

/// Escape glob metacharacters so a key prefix matches literally in `KEYS`.
fn glob_literal(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 2);
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('*');
    out
}

#[async_trait]
impl MutexStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(classify)?;
        Ok(reply.is_some())
    }

    async fn append_bounded(
        &self,
        prefix: &str,
        max: u32,
        id: &str,
        value: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let mut invocation = self.append.prepare_invoke();
        invocation
            .key(format!("{prefix}{id}"))
            .arg(glob_literal(prefix))
            .arg(max)
            .arg(value)
            .arg(millis(ttl));
        let created: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(classify)?;
        Ok(created == 1)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let updated: bool = conn
            .pexpire(key, millis(ttl) as i64)
            .await
            .map_err(classify)?;
        Ok(updated)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.del(key).await.map_err(classify)?;
        Ok(removed > 0)
    }

    async fn count(&self, prefix: &str) -> StoreResult<usize> {
        let mut conn = self.connection().await?;
        let keys: Vec<String> = conn.keys(glob_literal(prefix)).await.map_err(classify)?;
        Ok(keys.len())
    }

    async fn reconnect(&self) -> StoreResult<()> {
        let mut slot = self.conn.lock().await;
        *slot = None;
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(classify)?;
        *slot = Some(conn);
        info!("redis connection re-established");
        Ok(())
    }
}
