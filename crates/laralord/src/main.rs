use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, anyhow};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use lord_core::{PolicySettings, ProcessSupervisor, TenantResolver, WorkerContext, cancel_on_signal};
use lord_env::{DEFAULT_CAPACITY, Directory, build_resolver};
use lord_exec::{CommandExecutor, OutputConfig};
use lord_model::WorkerMode;
use lord_mutex::DistributedMutex;
use lord_observe::init_logger;
use lord_prometheus::{Encoder, PrometheusMetrics, TextEncoder};

mod config;
use config::{CONFIG_ENV, LaralordConfig};

const USAGE: &str = "usage: laralord <queue|scheduler> [config.toml]";

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let mode: WorkerMode = args.next().ok_or_else(|| anyhow!(USAGE))?.parse()?;
    let path = args
        .next()
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

    let cfg = LaralordConfig::load(path.as_deref())?;
    init_logger(&cfg.log)?;

    // one cooperative thread; tenant work runs in child processes
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("cannot start runtime")?;
    runtime.block_on(run(mode, cfg))
}

async fn run(mode: WorkerMode, cfg: LaralordConfig) -> anyhow::Result<()> {
    info!(%mode, pid = std::process::id(), "laralord starting");
    TenantResolver::from_config(&cfg.tenant)?;

    let (writer, reader) = Directory::spawn(DEFAULT_CAPACITY);
    let resolver = build_resolver(&cfg.env, writer)?;
    let mutex = DistributedMutex::from_config(&cfg.mutex)?;
    info!(store = mutex.store_name(), prefix = %cfg.mutex.prefix, "admission store ready");

    let (exec, policy) = match mode {
        WorkerMode::Queue => (&cfg.queue.exec, PolicySettings::queue(&cfg.queue)),
        WorkerMode::Scheduler => (&cfg.scheduler.exec, PolicySettings::scheduler(&cfg.scheduler)),
    };
    let mut exclude = cfg.env.exclude.clone();
    exclude.push(CONFIG_ENV.to_string());
    let executor = CommandExecutor::new(exec, exclude, OutputConfig::default())?;

    let metrics = Arc::new(PrometheusMetrics::new()?);
    let ctx = WorkerContext::new(reader, Arc::new(executor), Arc::new(mutex))
        .with_metrics(metrics.clone())
        .with_pool(cfg.pool.clone());

    let supervisor = ProcessSupervisor::new(resolver, ctx, policy)
        .with_sync_period(Duration::from_secs(cfg.env.sync_period_secs));

    let shutdown = CancellationToken::new();
    let signals = cancel_on_signal(shutdown.clone());
    let result = supervisor.run(shutdown.clone()).await;
    shutdown.cancel();
    let _ = signals.await;

    let mut buf = Vec::new();
    if TextEncoder::new().encode(&metrics.gather(), &mut buf).is_ok() {
        debug!(metrics = %String::from_utf8_lossy(&buf), "final metrics");
    }

    result.context("supervisor failed")?;
    info!("laralord stopped");
    Ok(())
}
