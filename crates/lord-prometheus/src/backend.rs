use std::sync::Arc;

use prometheus::{
    Counter, CounterVec, HistogramOpts, HistogramVec, Opts, Registry, proto::MetricFamily,
};

use lord_core::MetricsBackend;
use lord_exec::RunOutcome;

const NAMESPACE: &str = "laralord";

/// Prometheus metrics backend.
///
/// ## Label cardinality
/// All labels are bounded:
/// - `policy`: "queue", "scheduler", "request"
/// - `result`: "granted", "denied"
/// - `outcome`: "success", "failure", "signaled"
/// - `change`: "created", "updated", "removed"
#[derive(Clone)]
pub struct PrometheusMetrics {
    admissions: CounterVec,
    runs_completed: CounterVec,
    run_duration: HistogramVec,
    fork_rejections: Counter,
    reconcile_changes: CounterVec,
    registry: Arc<Registry>,
}

impl PrometheusMetrics {
    /// Create a new prometheus metrics backend with custom registry.
    pub fn new_with_registry(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let admissions = CounterVec::new(
            Opts::new("admissions_total", "Tenant admission attempts").namespace(NAMESPACE),
            &["policy", "result"],
        )?;
        registry.register(Box::new(admissions.clone()))?;

        let runs_completed = CounterVec::new(
            Opts::new("runs_completed_total", "Tenant runs observed to exit").namespace(NAMESPACE),
            &["policy", "outcome"],
        )?;
        registry.register(Box::new(runs_completed.clone()))?;

        let run_duration = HistogramVec::new(
            HistogramOpts::new("run_duration_seconds", "Tenant run duration in seconds")
                .namespace(NAMESPACE)
                .buckets(vec![0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
            &["policy"],
        )?;
        registry.register(Box::new(run_duration.clone()))?;

        let fork_rejections = Counter::with_opts(
            Opts::new(
                "fork_rejections_total",
                "Units of work rejected because the fork table was full",
            )
            .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(fork_rejections.clone()))?;

        let reconcile_changes = CounterVec::new(
            Opts::new("reconcile_changes_total", "Tenant environments changed by resync")
                .namespace(NAMESPACE),
            &["change"],
        )?;
        registry.register(Box::new(reconcile_changes.clone()))?;

        Ok(Self {
            admissions,
            runs_completed,
            run_duration,
            fork_rejections,
            reconcile_changes,
            registry,
        })
    }

    pub fn new() -> Result<Self, prometheus::Error> {
        Self::new_with_registry(Arc::new(Registry::new()))
    }

    /// Gather all metrics for exposition.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn record_admission(&self, policy: &str, granted: bool) {
        let result = if granted { "granted" } else { "denied" };
        self.admissions.with_label_values(&[policy, result]).inc();
    }

    fn record_run_completed(&self, policy: &str, outcome: RunOutcome, duration_ms: u64) {
        self.runs_completed
            .with_label_values(&[policy, outcome.as_label()])
            .inc();
        self.run_duration
            .with_label_values(&[policy])
            .observe(duration_ms as f64 / 1000.0);
    }

    fn record_fork_rejected(&self) {
        self.fork_rejections.inc();
    }

    fn record_reconcile(&self, created: usize, updated: usize, removed: usize) {
        for (change, n) in [("created", created), ("updated", updated), ("removed", removed)] {
            if n > 0 {
                self.reconcile_changes
                    .with_label_values(&[change])
                    .inc_by(n as f64);
            }
        }
    }
}
