use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::logger::{LogError, LogResult};

/// Validated `EnvFilter` expression.
///
/// Kept as a string so the config round-trips unchanged; converted into a
/// filter when the subscriber is installed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogLevel(String);

impl LogLevel {
    /// Validate `s` as an `EnvFilter` directive list.
    ///
    /// # Examples
    /// ```
    /// use lord_observe::LogLevel;
    ///
    /// let lvl = LogLevel::new("lord_core=debug,info").unwrap();
    /// assert_eq!(lvl.as_str(), "lord_core=debug,info");
    /// assert!(LogLevel::new("lord_core=loud").is_err());
    /// ```
    pub fn new(s: impl Into<String>) -> LogResult<Self> {
        Self::try_from(s.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_env_filter(&self) -> LogResult<EnvFilter> {
        EnvFilter::try_new(&self.0).map_err(|e| LogError::InvalidLevel(format!("{}: {e}", self.0)))
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self("info".to_string())
    }
}

impl FromStr for LogLevel {
    type Err = LogError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_owned())
    }
}

impl TryFrom<String> for LogLevel {
    type Error = LogError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        match EnvFilter::try_new(&s) {
            Ok(_) => Ok(Self(s)),
            Err(e) => Err(LogError::InvalidLevel(format!("{s}: {e}"))),
        }
    }
}

impl From<LogLevel> for String {
    fn from(l: LogLevel) -> Self {
        l.0
    }
}
