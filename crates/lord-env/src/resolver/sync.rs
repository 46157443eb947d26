use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{EnvResult, resolver::{Changes, EnvResolver}};

/// Run `resolver.sync_once()` every `period` until `cancel` fires.
///
/// `on_change` is called only for non-empty change sets. Recoverable
/// errors are logged and retried on the next tick; a fatal error ends the
/// task and is returned through the join handle. A zero period disables
/// syncing: the task just waits for cancellation.
pub fn spawn_sync<F>(
    resolver: Arc<dyn EnvResolver>,
    period: Duration,
    cancel: CancellationToken,
    mut on_change: F,
) -> JoinHandle<EnvResult<()>>
where
    F: FnMut(Changes) + Send + 'static,
{
    tokio::spawn(async move {
        if period.is_zero() {
            info!(resolver = resolver.name(), "environment sync disabled");
            cancel.cancelled().await;
            return Ok(());
        }

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick fires immediately and boot already loaded everything
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }
            match resolver.sync_once().await {
                Ok(changes) if changes.is_empty() => {}
                Ok(changes) => {
                    info!(resolver = resolver.name(), %changes, "environments changed");
                    on_change(changes);
                }
                Err(e) if e.is_fatal() => {
                    error!(resolver = resolver.name(), error = %e, "environment sync failed");
                    return Err(e);
                }
                Err(e) => {
                    warn!(resolver = resolver.name(), error = %e, "environment sync attempt failed");
                }
            }
        }
    })
}
