use std::{collections::HashMap, sync::Arc, time::Duration};

use lord_model::{Environment, ForkPoolConfig};
use tokio::{
    sync::{Mutex, MutexGuard},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{ExecError, ExecResult, Fork, ForkExit, SpawnContext, TenantExecutor};

/// Bounded table of outstanding children.
///
/// The table itself never waits: [`ForkPool::try_spawn`] either starts a
/// child or reports a full table. Retrying lives in [`SharedForkPool`].
pub struct ForkPool {
    max_forks: usize,
    retries: u32,
    retry_delay: Duration,
    table: HashMap<u32, Box<dyn Fork>>,
}

impl ForkPool {
    pub fn new(cfg: &ForkPoolConfig) -> Self {
        Self {
            max_forks: cfg.max_forks,
            retries: cfg.retries,
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
            table: HashMap::with_capacity(cfg.max_forks),
        }
    }

    pub fn shared(self) -> SharedForkPool {
        SharedForkPool {
            max_forks: self.max_forks,
            retries: self.retries,
            retry_delay: self.retry_delay,
            inner: Arc::new(Mutex::new(self)),
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.table.len() >= self.max_forks
    }

    pub fn pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.table.keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    /// Track an already started child.
    pub fn track(&mut self, fork: Box<dyn Fork>) {
        trace!(pid = fork.pid(), "fork tracked");
        self.table.insert(fork.pid(), fork);
    }

    /// Drop every child that has exited and return their exits.
    pub fn reap(&mut self) -> Vec<ForkExit> {
        let mut exits = Vec::new();
        self.table.retain(|pid, fork| match fork.try_reap() {
            Ok(None) => true,
            Ok(Some(exit)) => {
                debug!(pid, code = ?exit.code, elapsed_ms = exit.duration.as_millis() as u64, "fork reaped");
                exits.push(exit);
                false
            }
            Err(e) => {
                warn!(pid, error = %e, "cannot poll fork, dropping it from the table");
                false
            }
        });
        exits
    }

    /// Reap, then start a child if a slot is free. `Ok(None)` means full.
    pub fn try_spawn(
        &mut self,
        executor: &dyn TenantExecutor,
        env: &Environment,
        ctx: &SpawnContext,
    ) -> ExecResult<Option<u32>> {
        self.reap();
        if self.is_full() {
            return Ok(None);
        }
        let fork = executor.spawn(env, ctx)?;
        let pid = fork.pid();
        self.track(fork);
        Ok(Some(pid))
    }
}

/// [`ForkPool`] shared between request handlers and the reaper task.
///
/// The lock is taken once per attempt and released while sleeping, so every
/// caller gets its own bounded retry budget and rejections never queue.
#[derive(Clone)]
pub struct SharedForkPool {
    max_forks: usize,
    retries: u32,
    retry_delay: Duration,
    inner: Arc<Mutex<ForkPool>>,
}

impl SharedForkPool {
    pub async fn lock(&self) -> MutexGuard<'_, ForkPool> {
        self.inner.lock().await
    }

    pub async fn reap(&self) -> Vec<ForkExit> {
        self.inner.lock().await.reap()
    }

    /// Spawn one unit of work for `env`, or reject with
    /// [`ExecError::Capacity`] once the retries are spent.
    ///
    /// # Examples
    /// ```no_run
    /// use lord_exec::{CommandExecutor, ForkPool, OutputConfig, SpawnContext};
    /// use lord_model::{Environment, ExecConfig, ForkPoolConfig};
    ///
    /// # async fn run() -> lord_exec::ExecResult<()> {
    /// let exec = ExecConfig {
    ///     command: "php".into(),
    ///     args: vec!["public/index.php".into()],
    ///     ..Default::default()
    /// };
    /// let executor = CommandExecutor::new(&exec, Vec::new(), OutputConfig::default())?;
    /// let pool = ForkPool::new(&ForkPoolConfig::default()).shared();
    ///
    /// let pid = pool
    ///     .spawn(&executor, &Environment::empty("acme"), &SpawnContext::default())
    ///     .await?;
    /// assert!(pool.lock().await.pids().contains(&pid));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn spawn(
        &self,
        executor: &dyn TenantExecutor,
        env: &Environment,
        ctx: &SpawnContext,
    ) -> ExecResult<u32> {
        for attempt in 0..=self.retries {
            if let Some(pid) = self.inner.lock().await.try_spawn(executor, env, ctx)? {
                return Ok(pid);
            }
            if attempt < self.retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
        warn!(max = self.max_forks, "fork table is full");
        Err(ExecError::Capacity {
            max: self.max_forks,
        })
    }
}

/// Reap `pool` every `period` until `cancel` fires.
pub fn spawn_reaper(
    pool: SharedForkPool,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    pool.reap().await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use tokio::{task::JoinSet, time::Instant};

    use super::*;
    use crate::fork::testing::ScriptedFork;
    use crate::{CommandExecutor, OutputConfig};
    use lord_model::ExecConfig;

    fn cfg(max_forks: usize) -> ForkPoolConfig {
        ForkPoolConfig {
            max_forks,
            reap_period_ms: 10,
            retries: 10,
            retry_delay_ms: 10,
        }
    }

    fn sleeper(secs: &str) -> CommandExecutor {
        let exec = ExecConfig {
            command: "sleep".into(),
            args: vec![secs.into()],
            ..Default::default()
        };
        CommandExecutor::new(&exec, Vec::new(), OutputConfig::default()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn reap_removes_only_exited_children() {
        let mut pool = ForkPool::new(&cfg(4));
        pool.track(Box::new(ScriptedFork::new(10, 0)));
        pool.track(Box::new(ScriptedFork::new(11, 2)));

        let exits = pool.reap();
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].pid, 10);
        assert_eq!(pool.pids(), vec![11]);
    }

    #[tokio::test(start_paused = true)]
    async fn full_table_waits_then_rejects() {
        let mut pool = ForkPool::new(&cfg(2));
        pool.track(Box::new(ScriptedFork::new(1, u32::MAX)));
        pool.track(Box::new(ScriptedFork::new(2, u32::MAX)));
        let pool = pool.shared();

        let started = Instant::now();
        let err = pool
            .spawn(&sleeper("0"), &Environment::empty("acme"), &SpawnContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Capacity { max: 2 }));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100) && elapsed < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn slot_frees_up_while_retrying() {
        let mut pool = ForkPool::new(&cfg(1));
        // exits on the fourth poll, within the ten retries
        pool.track(Box::new(ScriptedFork::new(1, 3)));
        let pool = pool.shared();

        let pid = pool
            .spawn(&sleeper("0"), &Environment::empty("acme"), &SpawnContext::default())
            .await
            .unwrap();
        assert_eq!(pool.lock().await.pids(), vec![pid]);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_rejections_do_not_queue() {
        let mut pool = ForkPool::new(&cfg(1));
        pool.track(Box::new(ScriptedFork::new(1, u32::MAX)));
        let pool = pool.shared();
        let executor = Arc::new(sleeper("0"));

        let started = Instant::now();
        let mut set = JoinSet::new();
        for _ in 0..5 {
            let pool = pool.clone();
            let executor = executor.clone();
            set.spawn(async move {
                let res = pool
                    .spawn(executor.as_ref(), &Environment::empty("acme"), &SpawnContext::default())
                    .await;
                (res, started.elapsed())
            });
        }

        while let Some(joined) = set.join_next().await {
            let (res, elapsed) = joined.unwrap();
            assert!(matches!(res, Err(ExecError::Capacity { max: 1 })));
            // one retry budget each, not five stacked behind the lock
            assert!(elapsed < Duration::from_millis(150), "rejected after {elapsed:?}");
        }
    }

    #[tokio::test]
    async fn third_concurrent_child_is_rejected() {
        let executor = sleeper("0.5");
        let env = Environment::empty("acme");
        let ctx = SpawnContext::default();
        let pool = ForkPool::new(&cfg(2)).shared();

        pool.spawn(&executor, &env, &ctx).await.unwrap();
        pool.spawn(&executor, &env, &ctx).await.unwrap();
        let err = pool.spawn(&executor, &env, &ctx).await.unwrap_err();
        assert!(matches!(err, ExecError::Capacity { .. }));

        tokio::time::sleep(Duration::from_millis(800)).await;
        pool.spawn(&executor, &env, &ctx).await.unwrap();
        assert_eq!(pool.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn reaper_drains_the_shared_pool() {
        let executor = sleeper("0");
        let env = Environment::empty("acme");
        let pool = ForkPool::new(&cfg(4)).shared();
        pool.spawn(&executor, &env, &SpawnContext::default())
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let reaper = spawn_reaper(pool.clone(), Duration::from_millis(10), cancel.clone());

        tokio::time::timeout(Duration::from_secs(5), async {
            while !pool.lock().await.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("child reaped");

        cancel.cancel();
        reaper.await.unwrap();
    }
}
