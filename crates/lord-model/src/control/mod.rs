//! Messages exchanged between the supervisor and its workers.
//!
//! Both directions serialize to the flat JSON objects used on the wire:
//! `{"action":"reload"}` downstream and
//! `{"action":"started","worker_id":1,"pid":4242}` upstream.
use serde::{Deserialize, Serialize};

use crate::WorkerId;

/// Supervisor -> worker command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Tenant set changed; drop the cached candidate list.
    Reload,
    /// Finish the in-flight run, then exit.
    Stop,
    /// Liveness probe; the worker answers with [`ReportAction::Pong`].
    Ping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportAction {
    Started,
    Stopped,
    Pong,
}

/// Worker -> supervisor report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub action: ReportAction,
    pub worker_id: WorkerId,
    pub pid: u32,
}

impl WorkerReport {
    pub fn new(action: ReportAction, worker_id: WorkerId) -> Self {
        Self {
            action,
            worker_id,
            pid: std::process::id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_message_wire_shape() {
        let json = serde_json::to_string(&ControlMessage::Reload).unwrap();
        assert_eq!(json, r#"{"action":"reload"}"#);

        let parsed: ControlMessage = serde_json::from_str(r#"{"action":"stop"}"#).unwrap();
        assert_eq!(parsed, ControlMessage::Stop);
    }

    #[test]
    fn report_wire_shape() {
        let report = WorkerReport {
            action: ReportAction::Started,
            worker_id: 3,
            pid: 4242,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(json, r#"{"action":"started","worker_id":3,"pid":4242}"#);
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(serde_json::from_str::<ControlMessage>(r#"{"action":"restart"}"#).is_err());
    }
}
