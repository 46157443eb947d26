use std::{process::ExitStatus, time::Duration};

use tokio::{process::Child, time::Instant};

use crate::ExecResult;

mod pool;
pub use pool::{ForkPool, SharedForkPool, spawn_reaper};

/// How a tenant run ended, for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    /// Non-zero exit code.
    Failure,
    /// Terminated by a signal.
    Signaled,
}

impl RunOutcome {
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::Failure => "failure",
            RunOutcome::Signaled => "signaled",
        }
    }
}

/// Observed exit of a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkExit {
    pub pid: u32,
    /// `None` when the child was killed by a signal.
    pub code: Option<i32>,
    pub duration: Duration,
}

impl ForkExit {
    pub fn from_status(pid: u32, status: ExitStatus, duration: Duration) -> Self {
        Self {
            pid,
            code: status.code(),
            duration,
        }
    }

    pub fn outcome(&self) -> RunOutcome {
        match self.code {
            Some(0) => RunOutcome::Success,
            Some(_) => RunOutcome::Failure,
            None => RunOutcome::Signaled,
        }
    }
}

/// A running child process.
pub trait Fork: Send {
    fn pid(&self) -> u32;

    fn started_at(&self) -> Instant;

    /// Non-blocking exit check; `Ok(None)` while the child is running.
    fn try_reap(&mut self) -> ExecResult<Option<ForkExit>>;
}

/// [`Fork`] over a `tokio::process::Child`.
pub struct ChildFork {
    child: Child,
    pid: u32,
    started_at: Instant,
}

impl ChildFork {
    pub fn new(child: Child) -> Self {
        Self {
            pid: child.id().unwrap_or_default(),
            child,
            started_at: Instant::now(),
        }
    }
}

impl Fork for ChildFork {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn started_at(&self) -> Instant {
        self.started_at
    }

    fn try_reap(&mut self) -> ExecResult<Option<ForkExit>> {
        let Some(status) = self.child.try_wait()? else {
            return Ok(None);
        };
        Ok(Some(ForkExit::from_status(
            self.pid,
            status,
            self.started_at.elapsed(),
        )))
    }
}
