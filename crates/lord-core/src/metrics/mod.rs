//! Metrics collection abstraction.
//!
//! Backends (prometheus, ...) implement [`MetricsBackend`] and are injected
//! through [`crate::WorkerContext`].
mod backend;
pub use backend::{MetricsBackend, MetricsHandle};

mod noop;
pub use noop::NoOpMetrics;

use std::sync::Arc;

/// Create a no-op metrics handle.
#[inline]
pub fn noop_metrics() -> MetricsHandle {
    Arc::new(NoOpMetrics)
}
