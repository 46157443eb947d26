//! Prometheus metrics backend for laralord.
//!
//! [`PrometheusMetrics`] implements [`lord_core::MetricsBackend`] on a
//! private [`Registry`].
//!
//! ## Metrics
//! - `laralord_admissions_total{policy, result}` - Counter
//! - `laralord_runs_completed_total{policy, outcome}` - Counter
//! - `laralord_run_duration_seconds{policy}` - Histogram
//! - `laralord_fork_rejections_total` - Counter
//! - `laralord_reconcile_changes_total{change}` - Counter
//!
//! This crate does NOT serve `/metrics`; encode [`PrometheusMetrics::gather`]
//! with [`TextEncoder`] wherever the host exposes it.
mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
