//! In-process control channel between the supervisor and its workers.
//!
//! Each worker has its own downstream queue of [`ControlMessage`]s; all
//! workers share one upstream queue of [`WorkerReport`]s. Both sides only
//! ever poll, so neither can block the other.
use std::collections::BTreeMap;

use lord_model::{ControlMessage, ReportAction, WorkerId, WorkerReport};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tracing::{debug, trace};

/// Supervisor side.
pub struct ControlHub {
    workers: BTreeMap<WorkerId, UnboundedSender<ControlMessage>>,
    reports_tx: UnboundedSender<WorkerReport>,
    reports_rx: UnboundedReceiver<WorkerReport>,
}

impl ControlHub {
    pub fn new() -> Self {
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        Self {
            workers: BTreeMap::new(),
            reports_tx,
            reports_rx,
        }
    }

    /// Register `id` and return its end of the channel.
    pub fn attach(&mut self, id: WorkerId) -> WorkerLink {
        let (tx, rx) = mpsc::unbounded_channel();
        self.workers.insert(id, tx);
        WorkerLink {
            id,
            rx,
            tx: self.reports_tx.clone(),
        }
    }

    pub fn detach(&mut self, id: WorkerId) -> bool {
        self.workers.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Attached worker ids, ascending.
    pub fn ids(&self) -> Vec<WorkerId> {
        self.workers.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Send to one worker. `false` if it is unknown or gone.
    pub fn send(&mut self, id: WorkerId, msg: ControlMessage) -> bool {
        let Some(tx) = self.workers.get(&id) else {
            return false;
        };
        if tx.send(msg).is_ok() {
            return true;
        }
        self.workers.remove(&id);
        false
    }

    /// Send to every worker; workers whose link is closed are dropped.
    /// Returns the number of deliveries.
    pub fn broadcast(&mut self, msg: ControlMessage) -> usize {
        self.workers.retain(|id, tx| {
            let delivered = tx.send(msg).is_ok();
            if !delivered {
                debug!(worker = id, "dropping closed worker link");
            }
            delivered
        });
        trace!(?msg, workers = self.workers.len(), "broadcast");
        self.workers.len()
    }

    /// Everything reported since the previous drain.
    pub fn drain_reports(&mut self) -> Vec<WorkerReport> {
        let mut out = Vec::new();
        while let Ok(report) = self.reports_rx.try_recv() {
            out.push(report);
        }
        out
    }
}

impl Default for ControlHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Worker side.
pub struct WorkerLink {
    id: WorkerId,
    rx: UnboundedReceiver<ControlMessage>,
    tx: UnboundedSender<WorkerReport>,
}

impl WorkerLink {
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Pending commands, without waiting. A closed hub reads as `stop`.
    pub fn drain(&mut self) -> Vec<ControlMessage> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(msg) => out.push(msg),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !out.contains(&ControlMessage::Stop) {
                        out.push(ControlMessage::Stop);
                    }
                    break;
                }
            }
        }
        out
    }

    pub fn report(&self, action: ReportAction) {
        let report = WorkerReport::new(action, self.id);
        if self.tx.send(report).is_err() {
            debug!(worker = self.id, ?action, "supervisor gone, report dropped");
        }
    }
}
