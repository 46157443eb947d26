use std::io::IsTerminal;

use serde::{Deserialize, Serialize};

use crate::logger::{LogFormat, LogLevel};

/// `[log]` section of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` expression, e.g. `"info"` or `"lord_core=debug,info"`.
    pub level: LogLevel,
    /// Include the emitting module in each line.
    pub with_targets: bool,
    /// Colorize text output; ignored when stdout is not a terminal.
    pub use_color: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::default(),
            with_targets: false,
            use_color: true,
        }
    }
}

impl LogConfig {
    pub fn should_use_color(&self) -> bool {
        self.use_color && std::io::stdout().is_terminal()
    }
}
