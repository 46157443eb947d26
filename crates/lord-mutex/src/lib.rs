//! Fleet-wide admission primitives on top of an external TTL store.
//!
//! [`DistributedMutex`] offers an exclusive lock and a bounded counting
//! semaphore. Store failures never reach callers: after one
//! reconnect-and-retry they degrade to "not admitted".
mod error;
pub use error::{StoreError, StoreResult};

mod store;
pub use store::{MemoryStore, MutexStore, RedisStore, build_store};

mod mutex;
pub use mutex::{AdmissionToken, DistributedMutex};
