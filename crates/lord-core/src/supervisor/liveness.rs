use std::{collections::BTreeMap, time::Duration};

use lord_model::{ControlMessage, WorkerId};
use tokio::time::Instant;

use crate::control::ControlHub;

/// Outstanding pings, one round at a time.
///
/// A worker that has not answered by the next round is reported as silent.
/// Silence is only logged: a worker busy with a long child still drains its
/// control queue, so a missed pong means a stuck loop.
#[derive(Debug, Default)]
pub(crate) struct Liveness {
    outstanding: BTreeMap<WorkerId, Instant>,
}

impl Liveness {
    /// Ping every attached worker and return the ones that never answered
    /// the previous round.
    pub fn round(&mut self, hub: &mut ControlHub) -> Vec<WorkerId> {
        let silent: Vec<WorkerId> = self.outstanding.keys().copied().collect();
        self.outstanding.clear();

        let now = Instant::now();
        for id in hub.ids() {
            if hub.send(id, ControlMessage::Ping) {
                self.outstanding.insert(id, now);
            }
        }
        silent
    }

    /// Record a pong; returns the round trip when a ping was outstanding.
    pub fn pong(&mut self, id: WorkerId) -> Option<Duration> {
        self.outstanding.remove(&id).map(|sent| sent.elapsed())
    }

    pub fn forget(&mut self, id: WorkerId) {
        self.outstanding.remove(&id);
    }
}
