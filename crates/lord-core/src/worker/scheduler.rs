use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use lord_model::WorkerId;
use lord_mutex::DistributedMutex;
use time::OffsetDateTime;
use tracing::{debug, error};

use crate::worker::AdmissionPolicy;

/// Seconds since the Unix epoch.
pub type Clock = Arc<dyn Fn() -> f64 + Send + Sync>;

fn wall_clock() -> f64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1e9
}

/// Start of the next cycle: the next whole minute, plus one second, plus a
/// per-worker stagger of 100 ms.
pub fn next_cycle_at(now: f64, worker_id: WorkerId) -> f64 {
    (now / 60.0).ceil() * 60.0 + 1.0 + 0.1 * f64::from(worker_id)
}

/// Lock key shared by every worker of the fleet for one tenant and minute.
pub fn cycle_lock_key(tenant: &str, cycle_at: f64) -> String {
    let minute = (cycle_at / 60.0).floor() as i64 * 60;
    format!("{tenant}_{minute}")
}

/// Minute scheduler: each tenant runs at most once per minute fleet-wide.
///
/// Selection is withheld until the worker's next cycle boundary. A pass
/// that takes longer than `overrun` is reported, not cut short.
pub struct SchedulerPolicy {
    mutex: Arc<DistributedMutex>,
    worker_id: WorkerId,
    lock_ttl: Duration,
    overrun: Duration,
    owner: String,
    clock: Clock,
    cycle_at: f64,
    pass_started: Option<f64>,
}

impl SchedulerPolicy {
    pub fn new(
        mutex: Arc<DistributedMutex>,
        worker_id: WorkerId,
        lock_ttl: Duration,
        overrun: Duration,
    ) -> Self {
        Self::with_clock(mutex, worker_id, lock_ttl, overrun, Arc::new(wall_clock))
    }

    pub fn with_clock(
        mutex: Arc<DistributedMutex>,
        worker_id: WorkerId,
        lock_ttl: Duration,
        overrun: Duration,
        clock: Clock,
    ) -> Self {
        let cycle_at = next_cycle_at(clock(), worker_id);
        Self {
            mutex,
            worker_id,
            lock_ttl,
            overrun,
            owner: format!("{}:{worker_id}", std::process::id()),
            clock,
            cycle_at,
            pass_started: None,
        }
    }

    pub fn cycle_at(&self) -> f64 {
        self.cycle_at
    }
}

#[async_trait]
impl AdmissionPolicy for SchedulerPolicy {
    type Grant = ();

    fn name(&self) -> &'static str {
        "scheduler"
    }

    fn ready(&mut self) -> bool {
        let now = (self.clock)();
        if now < self.cycle_at {
            return false;
        }
        if self.pass_started.is_none() {
            debug!(worker = self.worker_id, cycle = self.cycle_at, "scheduler cycle started");
            self.pass_started = Some(now);
        }
        true
    }

    async fn admit(&mut self, tenant: &str) -> Option<()> {
        let key = cycle_lock_key(tenant, self.cycle_at);
        self.mutex
            .lock(&key, self.lock_ttl, &self.owner)
            .await
            .then_some(())
    }

    // the lock expires on its own; releasing early would let another
    // worker run the same minute again
    async fn release(&mut self, _grant: ()) {}

    fn pass_completed(&mut self) {
        let now = (self.clock)();
        if let Some(started) = self.pass_started.take() {
            let elapsed = now - started;
            if elapsed > self.overrun.as_secs_f64() {
                error!(
                    worker = self.worker_id,
                    elapsed_secs = elapsed,
                    "scheduler cycle overran; runs for the skipped minute are lost"
                );
            }
        }
        self.cycle_at = next_cycle_at(now, self.worker_id);
        debug!(worker = self.worker_id, next = self.cycle_at, "scheduler cycle completed");
    }
}
