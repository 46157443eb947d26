use std::sync::Arc;

use lord_exec::RunOutcome;

/// Backend metrics collection interface.
///
/// `policy` labels are bounded: "queue", "scheduler" or "request".
pub trait MetricsBackend: Send + Sync + 'static {
    /// Record one admission attempt for a tenant.
    fn record_admission(&self, policy: &str, granted: bool);

    /// Record the end of a tenant run.
    ///
    /// # Arguments
    /// - `policy`: Admission policy that started the run
    /// - `outcome`: How the child exited
    /// - `duration_ms`: Time between spawn and observed exit
    fn record_run_completed(&self, policy: &str, outcome: RunOutcome, duration_ms: u64);

    /// Record a unit of work rejected because the fork table was full.
    fn record_fork_rejected(&self);

    /// Record the sizes of one non-empty reconciliation result.
    fn record_reconcile(&self, created: usize, updated: usize, removed: usize);
}

/// Shared handle to metrics backend.
pub type MetricsHandle = Arc<dyn MetricsBackend>;
