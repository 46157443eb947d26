mod config;
mod error;
mod format;
mod level;
mod timer;

pub use config::LogConfig;
pub use error::{LogError, LogResult};
pub use format::LogFormat;
pub use level::LogLevel;
pub use timer::UtcRfc3339;

use tracing::Subscriber;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber described by `cfg`.
///
/// Must be called once, before the runtime spawns workers; a second call
/// fails with [`LogError::AlreadyInitialized`].
///
/// ```rust
/// use lord_observe::{LogConfig, init_logger};
///
/// init_logger(&LogConfig::default()).expect("logger");
/// tracing::info!("supervisor booting");
/// ```
pub fn init_logger(cfg: &LogConfig) -> LogResult<()> {
    let filter = cfg.level.to_env_filter()?;
    match cfg.format {
        LogFormat::Text => {
            let layer = fmt::layer()
                .with_ansi(cfg.should_use_color())
                .with_target(cfg.with_targets)
                .with_timer(UtcRfc3339);
            install(tracing_subscriber::registry().with(filter).with(layer))
        }
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_target(cfg.with_targets)
                .with_current_span(false)
                .with_timer(UtcRfc3339);
            install(tracing_subscriber::registry().with(filter).with(layer))
        }
    }
}

fn install<S>(subscriber: S) -> LogResult<()>
where
    S: Subscriber + Send + Sync + 'static,
{
    subscriber
        .try_init()
        .map_err(|_| LogError::AlreadyInitialized)
}
