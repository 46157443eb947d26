//! Tenant environment directory and the resolvers that keep it in sync
//! with a secret backend.
mod error;
pub use error::{DirectoryError, EnvError, EnvResult};

mod directory;
pub use directory::{DEFAULT_CAPACITY, Directory, DirectoryReader, DirectoryWriter};

pub mod resolver;
pub use resolver::{Changes, EnvResolver, VarsPolicy, build_resolver, reconcile, spawn_sync};
