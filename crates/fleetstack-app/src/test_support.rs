//! Shared fixtures for the crate's tests

use crate::actions::{AppContext, AppSettings};
use crate::cloud::MemoryCloud;
use crate::repository::RepositoryClient;
use fleetstack_core::MemoryStore;
use fleetstack_provision::FakeProvisioner;
use fleetstack_queue::MemoryQueue;
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct Harness {
    pub ctx: AppContext,
    pub store: Arc<MemoryStore>,
    pub provisioner: Arc<FakeProvisioner>,
    pub queue: Arc<MemoryQueue>,
    pub cloud: Arc<MemoryCloud>,
}

impl Harness {
    pub fn new(repository: &str) -> Self {
        let store = Arc::new(MemoryStore::new());
        let provisioner =
            Arc::new(FakeProvisioner::new().with_exec_timeout(Duration::from_millis(200)));
        let queue = Arc::new(MemoryQueue::new(Duration::from_secs(60)));
        let cloud = Arc::new(MemoryCloud::new());
        let ctx = AppContext {
            store: store.clone(),
            provisioner: provisioner.clone(),
            queue: queue.clone(),
            identity: cloud.clone(),
            storage: cloud.clone(),
            security_groups: cloud.clone(),
            repository: RepositoryClient::new(repository),
            settings: AppSettings {
                host: "http://fleetstack.test:8080".to_string(),
                s3_endpoint: "http://s3.fleetstack.test".to_string(),
                s3_location_constraint: true,
            },
        };
        Self {
            ctx,
            store,
            provisioner,
            queue,
            cloud,
        }
    }

    /// Repository calls fail to connect
    pub fn without_repository() -> Self {
        Self::new("http://127.0.0.1:1")
    }
}
