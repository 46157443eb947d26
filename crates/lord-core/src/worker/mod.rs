//! Per-worker admission loop.
//!
//! A worker repeatedly picks a tenant, asks its [`AdmissionPolicy`] for a
//! fleet-wide grant, runs one isolated child for it and releases the grant
//! as soon as the child is reaped. Control messages are drained between
//! steps; nothing in a step blocks on another worker.
use std::{fmt, time::Duration};

use async_trait::async_trait;
use lord_exec::{Fork, SpawnContext};
use lord_model::{ControlMessage, ReportAction, TenantKey, WorkerId};
use tracing::{debug, error, info, trace, warn};

use crate::{CoreResult, WorkerContext, control::WorkerLink};

mod candidates;
use candidates::Candidates;

mod queue;
pub use queue::QueuePolicy;

pub mod scheduler;
pub use scheduler::SchedulerPolicy;

/// Decides which tenants may start work and keeps their grants alive.
#[async_trait]
pub trait AdmissionPolicy: Send {
    /// Proof of admission held for the length of one run.
    type Grant: Send;

    fn name(&self) -> &'static str;

    /// Whether a selection pass may run now.
    fn ready(&mut self) -> bool {
        true
    }

    /// Try to take a grant for `tenant`; `None` moves on to the next candidate.
    async fn admit(&mut self, tenant: &str) -> Option<Self::Grant>;

    /// Called on every poll while the child is running.
    async fn keep_alive(&mut self, _grant: &mut Self::Grant) {}

    async fn release(&mut self, grant: Self::Grant);

    /// Every candidate of the current pass has been tried.
    fn pass_completed(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Selecting,
    Admitted,
    /// Stop requested while a child is still running.
    Draining,
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Idle => "idle",
            WorkerState::Selecting => "selecting",
            WorkerState::Admitted => "admitted",
            WorkerState::Draining => "draining",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// What the driver should do after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Wait(Duration),
    Stopped,
}

struct ActiveRun<G> {
    tenant: TenantKey,
    fork: Box<dyn Fork>,
    grant: G,
}

/// One worker: `Idle -> Selecting -> Admitted -> Idle`, ending in
/// `Draining -> Stopped` once `stop` arrives.
///
/// At most one child runs per worker. [`WorkerLoop::step`] never waits on
/// the child; [`WorkerLoop::run`] calls it and sleeps as each step says.
pub struct WorkerLoop<P: AdmissionPolicy> {
    id: WorkerId,
    ctx: WorkerContext,
    policy: P,
    link: WorkerLink,
    candidates: Candidates,
    state: WorkerState,
    active: Option<ActiveRun<P::Grant>>,
    stopping: bool,
}

impl<P: AdmissionPolicy> WorkerLoop<P> {
    pub fn new(ctx: WorkerContext, policy: P, link: WorkerLink) -> Self {
        Self {
            id: link.id(),
            ctx,
            policy,
            link,
            candidates: Candidates::default(),
            state: WorkerState::Idle,
            active: None,
            stopping: false,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Tenant of the in-flight run.
    pub fn running(&self) -> Option<&str> {
        self.active.as_ref().map(|run| run.tenant.as_str())
    }

    /// Drive the loop until `stop` and report `started`/`stopped`.
    pub async fn run(mut self) -> (WorkerId, CoreResult<()>) {
        info!(worker = self.id, policy = self.policy.name(), "worker started");
        self.link.report(ReportAction::Started);

        let result = loop {
            match self.step().await {
                Ok(Step::Wait(d)) => tokio::time::sleep(d).await,
                Ok(Step::Stopped) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = &result {
            error!(worker = self.id, error = %e, "worker loop failed");
            if let Some(run) = self.active.take() {
                self.policy.release(run.grant).await;
            }
            self.state = WorkerState::Stopped;
        }
        self.link.report(ReportAction::Stopped);
        info!(worker = self.id, "worker stopped");
        (self.id, result)
    }

    /// One non-blocking iteration of the state machine.
    pub async fn step(&mut self) -> CoreResult<Step> {
        self.handle_control();
        let pool = self.ctx.pool();
        let poll = Duration::from_millis(pool.poll_ms);
        let idle = Duration::from_millis(pool.idle_sleep_ms);

        if let Some(run) = self.active.as_mut() {
            match run.fork.try_reap()? {
                None => {
                    self.policy.keep_alive(&mut run.grant).await;
                    self.state = if self.stopping {
                        WorkerState::Draining
                    } else {
                        WorkerState::Admitted
                    };
                    return Ok(Step::Wait(poll));
                }
                Some(exit) => {
                    if let Some(run) = self.active.take() {
                        self.policy.release(run.grant).await;
                        let outcome = exit.outcome();
                        self.ctx.metrics().record_run_completed(
                            self.policy.name(),
                            outcome,
                            exit.duration.as_millis() as u64,
                        );
                        info!(
                            worker = self.id,
                            tenant = %run.tenant,
                            pid = exit.pid,
                            code = ?exit.code,
                            outcome = outcome.as_label(),
                            duration_ms = exit.duration.as_millis() as u64,
                            "tenant run finished"
                        );
                    }
                    self.state = WorkerState::Idle;
                }
            }
        }

        if self.stopping {
            self.state = WorkerState::Stopped;
            return Ok(Step::Stopped);
        }
        if !self.policy.ready() {
            self.state = WorkerState::Idle;
            return Ok(Step::Wait(idle));
        }

        self.state = WorkerState::Selecting;
        if self.select().await {
            self.state = WorkerState::Admitted;
            return Ok(Step::Wait(poll));
        }
        self.state = WorkerState::Idle;
        Ok(Step::Wait(idle))
    }

    fn handle_control(&mut self) {
        for msg in self.link.drain() {
            trace!(worker = self.id, ?msg, "control message");
            match msg {
                ControlMessage::Ping => self.link.report(ReportAction::Pong),
                ControlMessage::Reload => {
                    debug!(worker = self.id, "tenant list invalidated");
                    self.candidates.invalidate();
                }
                ControlMessage::Stop => {
                    if !self.stopping {
                        info!(worker = self.id, busy = self.active.is_some(), "stop requested");
                    }
                    self.stopping = true;
                }
            }
        }
    }

    /// Walk the rest of the current pass until one tenant is admitted and
    /// spawned. Returns `false` when the pass ran out.
    async fn select(&mut self) -> bool {
        if !self.candidates.is_loaded() {
            self.candidates.reset(self.ctx.directory().keys().await);
            debug!(worker = self.id, tenants = self.candidates.len(), "tenant list loaded");
        }

        while let Some(tenant) = self.candidates.next() {
            let Some(env) = self.ctx.directory().find(&tenant).await else {
                debug!(worker = self.id, tenant = %tenant, "no environment, skipped");
                continue;
            };

            let grant = self.policy.admit(&tenant).await;
            self.ctx
                .metrics()
                .record_admission(self.policy.name(), grant.is_some());
            let Some(grant) = grant else {
                trace!(worker = self.id, tenant = %tenant, "admission denied");
                continue;
            };

            match self
                .ctx
                .executor()
                .spawn(&env, &SpawnContext::for_worker(self.id))
            {
                Ok(fork) => {
                    debug!(worker = self.id, tenant = %tenant, pid = fork.pid(), "tenant run started");
                    self.active = Some(ActiveRun { tenant, fork, grant });
                    return true;
                }
                Err(e) => {
                    warn!(worker = self.id, tenant = %tenant, error = %e, "tenant run failed to start");
                    self.policy.release(grant).await;
                }
            }
        }

        self.policy.pass_completed();
        self.candidates.rewind();
        false
    }
}
