//! Worker supervision, admission loops and request-to-tenant routing.
pub mod error;
pub use error::{CoreError, CoreResult};

mod metrics;
pub use metrics::{MetricsBackend, MetricsHandle, NoOpMetrics, noop_metrics};

mod context;
pub use context::WorkerContext;

pub mod control;
pub use control::{ControlHub, WorkerLink};

pub mod worker;
pub use worker::{AdmissionPolicy, QueuePolicy, SchedulerPolicy, Step, WorkerLoop, WorkerState};

mod supervisor;
pub use supervisor::{PolicySettings, ProcessSupervisor, cancel_on_signal};

pub mod tenant;
pub use tenant::{Dispatched, RequestView, Rejection, TenantDispatcher, TenantResolver, TenantRule};

#[cfg(test)]
mod testing;
