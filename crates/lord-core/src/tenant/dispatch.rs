use std::sync::Arc;

use lord_env::DirectoryReader;
use lord_exec::{ExecError, SharedForkPool, SpawnContext, TenantExecutor};
use lord_model::{TenantKey, WorkerId};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{MetricsHandle, tenant::{RequestView, TenantResolver}};

/// Why a request did not get a tenant process.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("page not found")]
    Unresolved,

    #[error("tenant not found: {0}")]
    NotFound(TenantKey),

    #[error("server busy: {max} requests in flight")]
    Capacity { max: usize },

    #[error("request failed: {0}")]
    Failed(String),
}

impl Rejection {
    /// HTTP status the serving layer answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            Rejection::Unresolved | Rejection::NotFound(_) => 404,
            Rejection::Capacity { .. } => 503,
            Rejection::Failed(_) => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub tenant: TenantKey,
    pub pid: u32,
}

/// Resolve tenant, look up its environment, spawn through the fork pool.
pub struct TenantDispatcher {
    resolver: TenantResolver,
    directory: DirectoryReader,
    executor: Arc<dyn TenantExecutor>,
    pool: SharedForkPool,
    metrics: MetricsHandle,
    worker_id: Option<WorkerId>,
}

impl TenantDispatcher {
    pub fn new(
        resolver: TenantResolver,
        directory: DirectoryReader,
        executor: Arc<dyn TenantExecutor>,
        pool: SharedForkPool,
    ) -> Self {
        Self {
            resolver,
            directory,
            executor,
            pool,
            metrics: crate::metrics::noop_metrics(),
            worker_id: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_worker(mut self, worker_id: WorkerId) -> Self {
        self.worker_id = Some(worker_id);
        self
    }

    pub fn pool(&self) -> &SharedForkPool {
        &self.pool
    }

    pub async fn dispatch(&self, req: &RequestView) -> Result<Dispatched, Rejection> {
        let tenant = self.resolver.resolve(req).ok_or(Rejection::Unresolved)?;
        let Some(env) = self.directory.find(&tenant).await else {
            debug!(tenant = %tenant, "request for unknown tenant");
            return Err(Rejection::NotFound(tenant));
        };

        let ctx = SpawnContext {
            worker_id: self.worker_id,
        };
        let spawned = self.pool.spawn(self.executor.as_ref(), &env, &ctx).await;

        match spawned {
            Ok(pid) => Ok(Dispatched { tenant, pid }),
            Err(ExecError::Capacity { max }) => {
                self.metrics.record_fork_rejected();
                warn!(tenant = %tenant, max, "fork table full, request rejected");
                Err(Rejection::Capacity { max })
            }
            Err(e) => {
                warn!(tenant = %tenant, error = %e, "request process failed to start");
                Err(Rejection::Failed(e.to_string()))
            }
        }
    }
}
