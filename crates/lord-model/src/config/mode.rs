use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Which admission policy a supervisor pool runs.
///
/// - `Queue`: drain per-tenant job queues, bounded by a fleet-wide counting semaphore.
/// - `Scheduler`: run each tenant's scheduled commands once per minute fleet-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerMode {
    Queue,
    Scheduler,
}

impl WorkerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerMode::Queue => "queue",
            WorkerMode::Scheduler => "scheduler",
        }
    }
}

impl FromStr for WorkerMode {
    type Err = ModelError;
    fn from_str(s: &str) -> ModelResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" | "queue:work" => Ok(WorkerMode::Queue),
            "scheduler" | "schedule" | "schedule:run" => Ok(WorkerMode::Scheduler),
            other => Err(ModelError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for WorkerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
