//! Worker pool supervision.
//!
//! The supervisor boots the resolver, starts a fixed set of workers and
//! then only reacts: reconciliation changes become `reload` broadcasts,
//! shutdown becomes `stop`, and finished workers shrink the pool. It
//! returns once no worker is left.
use std::{sync::Arc, time::Duration};

use lord_env::{EnvResolver, spawn_sync};
use lord_model::{ControlMessage, QueueConfig, ReportAction, SchedulerConfig, WorkerId};
use tokio::{
    sync::mpsc,
    task::{JoinHandle, JoinSet},
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    CoreError, CoreResult, WorkerContext,
    control::{ControlHub, WorkerLink},
    worker::{QueuePolicy, SchedulerPolicy, WorkerLoop},
};

mod liveness;
use liveness::Liveness;

/// Which admission policy the workers run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicySettings {
    Queue { max_jobs: u32 },
    Scheduler { lock_ttl: Duration, overrun: Duration },
}

impl PolicySettings {
    pub fn queue(cfg: &QueueConfig) -> Self {
        PolicySettings::Queue {
            max_jobs: cfg.max_jobs,
        }
    }

    pub fn scheduler(cfg: &SchedulerConfig) -> Self {
        PolicySettings::Scheduler {
            lock_ttl: Duration::from_secs(cfg.lock_ttl_secs),
            overrun: Duration::from_secs(cfg.overrun_secs),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PolicySettings::Queue { .. } => "queue",
            PolicySettings::Scheduler { .. } => "scheduler",
        }
    }
}

type WorkerSet = JoinSet<(WorkerId, CoreResult<()>)>;

pub struct ProcessSupervisor {
    resolver: Arc<dyn EnvResolver>,
    ctx: WorkerContext,
    policy: PolicySettings,
    sync_period: Duration,
    ping_period: Duration,
}

impl ProcessSupervisor {
    pub fn new(resolver: Arc<dyn EnvResolver>, ctx: WorkerContext, policy: PolicySettings) -> Self {
        Self {
            resolver,
            ctx,
            policy,
            sync_period: Duration::from_secs(30),
            ping_period: Duration::from_secs(10),
        }
    }

    /// Zero disables periodic resync.
    pub fn with_sync_period(mut self, period: Duration) -> Self {
        self.sync_period = period;
        self
    }

    /// How often workers are pinged. Zero disables liveness checks.
    pub fn with_ping_period(mut self, period: Duration) -> Self {
        self.ping_period = period;
        self
    }

    fn spawn_worker(&self, workers: &mut WorkerSet, link: WorkerLink) {
        let ctx = self.ctx.clone();
        let id = link.id();
        match self.policy {
            PolicySettings::Queue { max_jobs } => {
                let policy = QueuePolicy::new(ctx.mutex().clone(), max_jobs, id);
                workers.spawn(WorkerLoop::new(ctx, policy, link).run());
            }
            PolicySettings::Scheduler { lock_ttl, overrun } => {
                let policy = SchedulerPolicy::new(ctx.mutex().clone(), id, lock_ttl, overrun);
                workers.spawn(WorkerLoop::new(ctx, policy, link).run());
            }
        }
    }

    /// Boot, supervise, and return when every worker has stopped.
    ///
    /// Cancelling `shutdown` asks workers to finish their current run and
    /// stop. A fatal resync error does the same and is returned at the end.
    pub async fn run(self, shutdown: CancellationToken) -> CoreResult<()> {
        let size = self.ctx.pool().workers;
        info!(
            policy = self.policy.name(),
            resolver = self.resolver.name(),
            workers = size,
            "supervisor starting"
        );

        self.resolver.boot().await?;
        let tenants = self.ctx.directory().len().await;
        info!(tenants, "environments loaded");

        let mut hub = ControlHub::new();
        let mut workers = WorkerSet::new();
        for id in 1..=size {
            let link = hub.attach(id);
            self.spawn_worker(&mut workers, link);
        }

        let (changes_tx, mut changes_rx) = mpsc::unbounded_channel();
        let sync_cancel = CancellationToken::new();
        let mut sync = spawn_sync(
            self.resolver.clone(),
            self.sync_period,
            sync_cancel.clone(),
            move |changes| {
                let _ = changes_tx.send(changes);
            },
        );
        let mut sync_running = true;

        let mut tick = tokio::time::interval(Duration::from_millis(self.ctx.pool().tick_ms));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let pinging = !self.ping_period.is_zero();
        let mut ping = tokio::time::interval(self.ping_period.max(Duration::from_millis(1)));
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut liveness = Liveness::default();

        let mut terminating = false;
        let mut fatal: Option<CoreError> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled(), if !terminating => {
                    terminating = true;
                    let n = hub.broadcast(ControlMessage::Stop);
                    info!(workers = n, "shutdown requested, stopping workers");
                }
                Some(changes) = changes_rx.recv() => {
                    self.ctx.metrics().record_reconcile(
                        changes.created.len(),
                        changes.updated.len(),
                        changes.removed.len(),
                    );
                    if !terminating {
                        hub.broadcast(ControlMessage::Reload);
                    }
                }
                res = &mut sync, if sync_running => {
                    sync_running = false;
                    let err = match res {
                        Ok(Ok(())) => None,
                        Ok(Err(e)) => Some(CoreError::Env(e)),
                        Err(e) => Some(CoreError::Supervisor(format!("sync task failed: {e}"))),
                    };
                    if let Some(e) = err {
                        error!(error = %e, "environment sync stopped, shutting down");
                        fatal = Some(e);
                        terminating = true;
                        hub.broadcast(ControlMessage::Stop);
                    }
                }
                _ = ping.tick(), if pinging && !terminating => {
                    for id in liveness.round(&mut hub) {
                        warn!(worker = id, period_ms = self.ping_period.as_millis() as u64, "worker did not answer ping");
                    }
                }
                _ = tick.tick() => {
                    for report in hub.drain_reports() {
                        match report.action {
                            ReportAction::Pong => {
                                if let Some(rtt) = liveness.pong(report.worker_id) {
                                    debug!(worker = report.worker_id, rtt_ms = rtt.as_millis() as u64, "pong");
                                }
                            }
                            action => debug!(worker = report.worker_id, pid = report.pid, ?action, "worker report"),
                        }
                    }
                    reap_workers(&mut workers, &mut hub, &mut liveness);
                    if workers.is_empty() {
                        break;
                    }
                }
            }
        }

        sync_cancel.cancel();
        if sync_running {
            let _ = sync.await;
        }
        info!("supervisor stopped");
        fatal.map_or(Ok(()), Err)
    }
}

fn reap_workers(workers: &mut WorkerSet, hub: &mut ControlHub, liveness: &mut Liveness) {
    while let Some(res) = workers.try_join_next() {
        match res {
            Ok((id, Ok(()))) => {
                hub.detach(id);
                liveness.forget(id);
            }
            Ok((id, Err(e))) => {
                hub.detach(id);
                liveness.forget(id);
                warn!(worker = id, error = %e, remaining = workers.len(), "worker exited with an error, not restarted");
            }
            // the closed link is pruned on the next broadcast
            Err(e) => error!(error = %e, remaining = workers.len(), "worker task aborted"),
        }
    }
}

/// Cancel `token` on SIGINT or SIGTERM.
pub fn cancel_on_signal(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut term = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "cannot listen for SIGTERM");
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
                _ = term.recv() => info!("SIGTERM received"),
                _ = token.cancelled() => return,
            }
        }
        #[cfg(not(unix))]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("interrupt received"),
                _ = token.cancelled() => return,
            }
        }
        token.cancel();
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use lord_env::{Directory, EnvError, build_resolver};
    use lord_model::{DirectorySourceConfig, EnvConfig, ResolverConfig};

    use super::*;
    use crate::testing::{self, StubExecutor};

    fn supervisor(root: &Path, executor: Arc<StubExecutor>) -> ProcessSupervisor {
        let cfg = EnvConfig {
            resolver: ResolverConfig::Directory(DirectorySourceConfig {
                path: root.to_path_buf(),
            }),
            ..Default::default()
        };
        let (writer, _) = Directory::spawn(16);
        let resolver = build_resolver(&cfg, writer).unwrap();
        let ctx = testing::with_executor(resolver.reader(), executor);
        ProcessSupervisor::new(resolver, ctx, PolicySettings::Queue { max_jobs: 1 })
            .with_sync_period(Duration::from_millis(50))
            .with_ping_period(Duration::from_millis(30))
    }

    #[tokio::test]
    async fn missing_source_fails_at_boot() {
        let sup = supervisor(Path::new("/nonexistent/laralord"), Arc::new(StubExecutor::new(0)));
        let err = sup.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CoreError::Env(EnvError::SourceNotFound(_))));
    }

    #[tokio::test]
    async fn runs_tenants_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env.acme"), "APP_NAME=acme\n").unwrap();
        let executor = Arc::new(StubExecutor::new(1));
        let sup = supervisor(dir.path(), executor.clone());

        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        let root = dir.path().to_path_buf();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            std::fs::write(root.join(".env.globex"), "APP_NAME=globex\n").unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        tokio::time::timeout(Duration::from_secs(5), sup.run(shutdown))
            .await
            .expect("supervisor exits after shutdown")
            .unwrap();

        let spawned = executor.spawned();
        assert!(spawned.iter().any(|k| k == "acme"));
        // picked up through resync and reload
        assert!(spawned.iter().any(|k| k == "globex"));
    }

    #[test]
    fn policy_settings_from_config() {
        let q = PolicySettings::queue(&QueueConfig::default());
        assert_eq!(q, PolicySettings::Queue { max_jobs: 1 });
        let s = PolicySettings::scheduler(&SchedulerConfig::default());
        assert_eq!(
            s,
            PolicySettings::Scheduler {
                lock_ttl: Duration::from_secs(70),
                overrun: Duration::from_secs(60),
            }
        );
        assert_eq!(s.name(), "scheduler");
    }
}
