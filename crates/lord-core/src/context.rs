use std::{fmt, sync::Arc};

use lord_env::DirectoryReader;
use lord_exec::TenantExecutor;
use lord_model::PoolConfig;
use lord_mutex::DistributedMutex;

use crate::metrics::MetricsHandle;

/// Everything a worker loop needs, injected at construction.
#[derive(Clone)]
pub struct WorkerContext {
    directory: DirectoryReader,
    executor: Arc<dyn TenantExecutor>,
    mutex: Arc<DistributedMutex>,
    metrics: MetricsHandle,
    pool: PoolConfig,
}

impl WorkerContext {
    pub fn new(
        directory: DirectoryReader,
        executor: Arc<dyn TenantExecutor>,
        mutex: Arc<DistributedMutex>,
    ) -> Self {
        Self {
            directory,
            executor,
            mutex,
            metrics: crate::metrics::noop_metrics(),
            pool: PoolConfig::default(),
        }
    }

    pub fn directory(&self) -> &DirectoryReader {
        &self.directory
    }

    pub fn executor(&self) -> &Arc<dyn TenantExecutor> {
        &self.executor
    }

    pub fn mutex(&self) -> &Arc<DistributedMutex> {
        &self.mutex
    }

    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }

    pub fn pool(&self) -> &PoolConfig {
        &self.pool
    }

    /// Replace the metrics backend and return updated context.
    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("executor", &self.executor.name())
            .field("mutex", &self.mutex.store_name())
            .field("metrics", &"<handle>")
            .field("pool", &self.pool)
            .finish()
    }
}
