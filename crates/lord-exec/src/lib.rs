//! Process isolation for tenant work.
//!
//! Every tenant run happens in a freshly spawned child carrying a copy of
//! the tenant environment. Parents never block on children: exits are
//! observed by polling [`Fork::try_reap`].
mod error;
pub use error::{ExecError, ExecResult};

mod fork;
pub use fork::{ChildFork, Fork, ForkExit, ForkPool, RunOutcome, SharedForkPool, spawn_reaper};

mod subprocess;
pub use subprocess::{CommandExecutor, OutputConfig, SpawnContext, TenantExecutor};
