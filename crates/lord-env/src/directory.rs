//! Process-wide tenant table.
//!
//! The table is owned by a single actor task. The resolver holds the only
//! [`DirectoryWriter`]; workers hold cloned [`DirectoryReader`]s and receive
//! immutable `Arc<Environment>` snapshots, so a resync never mutates a row
//! a worker is looking at.
use std::{collections::HashMap, sync::Arc};

use lord_model::{Environment, TenantKey};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace};

use crate::DirectoryError;

/// Default number of tenants a directory can hold.
pub const DEFAULT_CAPACITY: usize = 1024;

enum ReadOp {
    Find {
        key: TenantKey,
        reply: oneshot::Sender<Option<Arc<Environment>>>,
    },
    Keys {
        reply: oneshot::Sender<Vec<TenantKey>>,
    },
    Len {
        reply: oneshot::Sender<usize>,
    },
}

enum WriteOp {
    Store {
        env: Environment,
        reply: oneshot::Sender<Result<(), DirectoryError>>,
    },
    Delete {
        key: TenantKey,
        reply: oneshot::Sender<bool>,
    },
}

/// Actor state. Created through [`Directory::spawn`].
pub struct Directory {
    rows: HashMap<TenantKey, Arc<Environment>>,
    capacity: usize,
}

impl Directory {
    /// Start the actor on the current runtime and return its handles.
    pub fn spawn(capacity: usize) -> (DirectoryWriter, DirectoryReader) {
        let (read_tx, read_rx) = mpsc::unbounded_channel();
        let (write_tx, write_rx) = mpsc::unbounded_channel();

        let actor = Directory {
            rows: HashMap::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity,
        };
        tokio::spawn(actor.run(read_rx, write_rx));

        let reader = DirectoryReader { tx: read_tx };
        let writer = DirectoryWriter {
            tx: write_tx,
            reader: reader.clone(),
        };
        (writer, reader)
    }

    async fn run(
        mut self,
        mut read_rx: mpsc::UnboundedReceiver<ReadOp>,
        mut write_rx: mpsc::UnboundedReceiver<WriteOp>,
    ) {
        debug!(capacity = self.capacity, "environment directory started");
        loop {
            tokio::select! {
                biased;
                Some(op) = write_rx.recv() => self.apply_write(op),
                Some(op) = read_rx.recv() => self.apply_read(op),
                else => break,
            }
        }
        debug!(rows = self.rows.len(), "environment directory stopped");
    }

    fn apply_write(&mut self, op: WriteOp) {
        match op {
            WriteOp::Store { env, reply } => {
                let res = self.store(env);
                let _ = reply.send(res);
            }
            WriteOp::Delete { key, reply } => {
                let _ = reply.send(self.rows.remove(&key).is_some());
            }
        }
    }

    fn apply_read(&self, op: ReadOp) {
        match op {
            ReadOp::Find { key, reply } => {
                let _ = reply.send(self.rows.get(&key).cloned());
            }
            ReadOp::Keys { reply } => {
                let mut keys: Vec<TenantKey> = self.rows.keys().cloned().collect();
                keys.sort();
                let _ = reply.send(keys);
            }
            ReadOp::Len { reply } => {
                let _ = reply.send(self.rows.len());
            }
        }
    }

    fn store(&mut self, env: Environment) -> Result<(), DirectoryError> {
        if !self.rows.contains_key(env.key()) && self.rows.len() >= self.capacity {
            return Err(DirectoryError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        trace!(tenant = %env.key(), version = env.version(), "directory row stored");
        self.rows.insert(env.key().to_string(), Arc::new(env));
        Ok(())
    }
}

/// Read-only handle, cheap to clone.
#[derive(Clone)]
pub struct DirectoryReader {
    tx: mpsc::UnboundedSender<ReadOp>,
}

impl DirectoryReader {
    /// Current row for `key`. Never fails: a stopped directory yields `None`.
    pub async fn find(&self, key: &str) -> Option<Arc<Environment>> {
        let (reply, rx) = oneshot::channel();
        let op = ReadOp::Find {
            key: key.to_string(),
            reply,
        };
        if self.tx.send(op).is_err() {
            error!(tenant = %key, "lookup on a stopped environment directory");
            return None;
        }
        rx.await.ok().flatten()
    }

    /// Re-read the current row for an environment obtained earlier.
    pub async fn fresh(&self, env: &Environment) -> Option<Arc<Environment>> {
        self.find(env.key()).await
    }

    /// All tenant keys, sorted.
    pub async fn keys(&self) -> Vec<TenantKey> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(ReadOp::Keys { reply }).is_err() {
            error!("key listing on a stopped environment directory");
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(ReadOp::Len { reply }).is_err() {
            return 0;
        }
        rx.await.unwrap_or_default()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// The single mutating handle. Not `Clone`.
pub struct DirectoryWriter {
    tx: mpsc::UnboundedSender<WriteOp>,
    reader: DirectoryReader,
}

impl DirectoryWriter {
    /// Insert or replace the row for `env.key()`.
    ///
    /// Inserting a new key into a full directory fails with
    /// [`DirectoryError::CapacityExceeded`]; nothing is evicted.
    pub async fn store(&self, env: Environment) -> Result<(), DirectoryError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WriteOp::Store { env, reply })
            .map_err(|_| DirectoryError::Uninitialized)?;
        rx.await.map_err(|_| DirectoryError::Uninitialized)?
    }

    /// Remove a row; returns whether it existed.
    pub async fn delete(&self, key: &str) -> Result<bool, DirectoryError> {
        let (reply, rx) = oneshot::channel();
        let op = WriteOp::Delete {
            key: key.to_string(),
            reply,
        };
        self.tx.send(op).map_err(|_| DirectoryError::Uninitialized)?;
        rx.await.map_err(|_| DirectoryError::Uninitialized)
    }

    pub async fn find(&self, key: &str) -> Option<Arc<Environment>> {
        self.reader.find(key).await
    }

    pub async fn keys(&self) -> Vec<TenantKey> {
        self.reader.keys().await
    }

    /// A new reader attached to the same table.
    pub fn reader(&self) -> DirectoryReader {
        self.reader.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lord_model::Vars;

    fn env(key: &str, version: u64) -> Environment {
        Environment::new(key, Vars::single("K", key), version, time::OffsetDateTime::UNIX_EPOCH)
    }

    #[tokio::test]
    async fn store_find_delete() {
        let (writer, reader) = Directory::spawn(8);

        writer.store(env("acme", 1)).await.unwrap();
        writer.store(env("globex", 1)).await.unwrap();

        let row = reader.find("acme").await.expect("acme stored");
        assert_eq!(row.version(), 1);
        assert_eq!(reader.keys().await, vec!["acme", "globex"]);

        assert!(writer.delete("acme").await.unwrap());
        assert!(!writer.delete("acme").await.unwrap());
        assert!(reader.find("acme").await.is_none());
        assert_eq!(reader.len().await, 1);
    }

    #[tokio::test]
    async fn readers_hold_snapshots() {
        let (writer, reader) = Directory::spawn(8);
        writer.store(env("acme", 1)).await.unwrap();

        let before = reader.find("acme").await.unwrap();
        writer.store(env("acme", 2)).await.unwrap();

        assert_eq!(before.version(), 1);
        assert_eq!(reader.fresh(&before).await.unwrap().version(), 2);
    }

    #[tokio::test]
    async fn overflow_is_an_error() {
        let (writer, reader) = Directory::spawn(2);
        writer.store(env("a", 0)).await.unwrap();
        writer.store(env("b", 0)).await.unwrap();

        let err = writer.store(env("c", 0)).await.unwrap_err();
        assert!(matches!(err, DirectoryError::CapacityExceeded { capacity: 2 }));

        // replacing an existing row is still allowed at capacity
        writer.store(env("b", 1)).await.unwrap();
        assert_eq!(reader.len().await, 2);
        assert!(reader.find("c").await.is_none());
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let (_writer, reader) = Directory::spawn(4);
        assert!(reader.find("nobody").await.is_none());
        assert!(reader.is_empty().await);
    }
}
