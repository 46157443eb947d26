use std::sync::Arc;

use async_trait::async_trait;
use lord_model::WorkerId;
use lord_mutex::{AdmissionToken, DistributedMutex};

use crate::worker::AdmissionPolicy;

/// Queue drainer: at most `max_jobs` concurrent runs per tenant across the
/// fleet, through the counting semaphore.
pub struct QueuePolicy {
    mutex: Arc<DistributedMutex>,
    max_jobs: u32,
    owner: String,
}

impl QueuePolicy {
    pub fn new(mutex: Arc<DistributedMutex>, max_jobs: u32, worker_id: WorkerId) -> Self {
        Self {
            mutex,
            max_jobs,
            owner: format!("{}:{worker_id}", std::process::id()),
        }
    }
}

#[async_trait]
impl AdmissionPolicy for QueuePolicy {
    type Grant = AdmissionToken;

    fn name(&self) -> &'static str {
        "queue"
    }

    async fn admit(&mut self, tenant: &str) -> Option<AdmissionToken> {
        self.mutex.incr(tenant, self.max_jobs, &self.owner).await
    }

    async fn keep_alive(&mut self, grant: &mut AdmissionToken) {
        self.mutex.refresh(grant).await;
    }

    async fn release(&mut self, grant: AdmissionToken) {
        self.mutex.decr(&grant).await;
    }
}

#[cfg(test)]
mod tests {
    use lord_model::MutexConfig;
    use lord_mutex::MemoryStore;

    use super::*;

    #[tokio::test]
    async fn admits_up_to_max_jobs() {
        let mutex = Arc::new(DistributedMutex::new(
            Arc::new(MemoryStore::new()),
            &MutexConfig::default(),
        ));
        let mut a = QueuePolicy::new(mutex.clone(), 2, 1);
        let mut b = QueuePolicy::new(mutex.clone(), 2, 2);

        let first = a.admit("acme").await.expect("first slot");
        let _second = b.admit("acme").await.expect("second slot");
        assert!(a.admit("acme").await.is_none());

        a.release(first).await;
        assert_eq!(mutex.live("acme").await, 1);
        assert!(a.admit("acme").await.is_some());
    }
}
