//! Test doubles shared by the unit tests of this crate.
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU32, AtomicUsize, Ordering},
};

use lord_env::{Directory, DirectoryWriter};
use lord_exec::{ExecError, ExecResult, Fork, ForkExit, RunOutcome, SpawnContext, TenantExecutor};
use lord_model::{Environment, MutexConfig, PoolConfig, TenantKey, Vars, WorkerId};
use lord_mutex::{DistributedMutex, MemoryStore};
use tokio::time::Instant;

use crate::{MetricsBackend, WorkerContext};

/// Exits with `code` after `polls` unsuccessful reaps.
pub(crate) struct StubFork {
    pid: u32,
    polls: u32,
    code: i32,
    started_at: Instant,
}

impl Fork for StubFork {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn started_at(&self) -> Instant {
        self.started_at
    }

    fn try_reap(&mut self) -> ExecResult<Option<ForkExit>> {
        if self.polls > 0 {
            self.polls -= 1;
            return Ok(None);
        }
        Ok(Some(ForkExit {
            pid: self.pid,
            code: Some(self.code),
            duration: self.started_at.elapsed(),
        }))
    }
}

#[derive(Default)]
pub(crate) struct StubExecutor {
    pub polls: u32,
    pub fail: bool,
    next_pid: AtomicU32,
    spawned: Mutex<Vec<(TenantKey, Option<WorkerId>)>>,
}

impl StubExecutor {
    pub fn new(polls: u32) -> Self {
        Self {
            polls,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn spawned(&self) -> Vec<TenantKey> {
        self.spawned
            .lock()
            .unwrap()
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn spawned_by(&self, worker: WorkerId) -> usize {
        self.spawned
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, w)| *w == Some(worker))
            .count()
    }
}

impl TenantExecutor for StubExecutor {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn spawn(&self, env: &Environment, ctx: &SpawnContext) -> ExecResult<Box<dyn Fork>> {
        if self.fail {
            return Err(ExecError::Spawn {
                command: "stub".into(),
                reason: "refused".into(),
            });
        }
        self.spawned
            .lock()
            .unwrap()
            .push((env.key().to_string(), ctx.worker_id));
        let pid = 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubFork {
            pid,
            polls: self.polls,
            code: 0,
            started_at: Instant::now(),
        }))
    }
}

#[derive(Default)]
pub(crate) struct RecordingMetrics {
    granted: AtomicUsize,
    denied: AtomicUsize,
    runs: Mutex<Vec<(String, RunOutcome)>>,
    fork_rejected: AtomicUsize,
    reconciles: AtomicUsize,
}

impl RecordingMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn admissions(&self, granted: bool) -> usize {
        if granted {
            self.granted.load(Ordering::SeqCst)
        } else {
            self.denied.load(Ordering::SeqCst)
        }
    }

    pub fn runs(&self) -> Vec<(String, RunOutcome)> {
        self.runs.lock().unwrap().clone()
    }

    pub fn fork_rejections(&self) -> usize {
        self.fork_rejected.load(Ordering::SeqCst)
    }
}

impl MetricsBackend for RecordingMetrics {
    fn record_admission(&self, _: &str, granted: bool) {
        if granted {
            self.granted.fetch_add(1, Ordering::SeqCst);
        } else {
            self.denied.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn record_run_completed(&self, policy: &str, outcome: RunOutcome, _: u64) {
        self.runs.lock().unwrap().push((policy.to_string(), outcome));
    }

    fn record_fork_rejected(&self) {
        self.fork_rejected.fetch_add(1, Ordering::SeqCst);
    }

    fn record_reconcile(&self, _: usize, _: usize, _: usize) {
        self.reconciles.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) fn env(key: &str) -> Environment {
    Environment::new(key, Vars::single("APP_KEY", key), 1, time::OffsetDateTime::UNIX_EPOCH)
}

/// Directory writer, a context on an in-memory mutex and the stub executor
/// whose children exit after `polls` reaps.
pub(crate) fn context(polls: u32) -> (DirectoryWriter, WorkerContext, Arc<StubExecutor>) {
    let executor = Arc::new(StubExecutor::new(polls));
    let (writer, reader) = Directory::spawn(16);
    let ctx = with_executor(reader, executor.clone());
    (writer, ctx, executor)
}

pub(crate) fn with_executor(
    reader: lord_env::DirectoryReader,
    executor: Arc<dyn TenantExecutor>,
) -> WorkerContext {
    let mutex = DistributedMutex::new(Arc::new(MemoryStore::new()), &MutexConfig::default());
    WorkerContext::new(reader, executor, Arc::new(mutex)).with_pool(PoolConfig {
        workers: 2,
        tick_ms: 10,
        idle_sleep_ms: 10,
        poll_ms: 5,
    })
}
