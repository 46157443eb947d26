use lord_exec::RunOutcome;

use crate::metrics::backend::MetricsBackend;

/// No-op metrics backend that compiles to nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl MetricsBackend for NoOpMetrics {
    #[inline(always)]
    fn record_admission(&self, _: &str, _: bool) {}

    #[inline(always)]
    fn record_run_completed(&self, _: &str, _: RunOutcome, _: u64) {}

    #[inline(always)]
    fn record_fork_rejected(&self) {}

    #[inline(always)]
    fn record_reconcile(&self, _: usize, _: usize, _: usize) {}
}
