#![allow(dead_code)]

pub mod strategies;

use std::sync::Arc;
use tokio::task::JoinHandle;

use tenant_balancer::config::{RegistryConfig, ServiceConfig};
use tenant_balancer::error::BalancerResult;
use tenant_balancer::orchestration::{BalancerHandle, RequestDispatcher, ServiceExit};
use tenant_balancer::registry::MovementRegistry;
use tenant_balancer::services::{
    InMemoryDataMover, PeerFailureSignal, PipelineReporter, WatchFailureMonitor,
};
use tenant_balancer::storage::MemoryKeyValueStore;
use tenant_balancer::system_context::BalancerContext;

pub const LOCAL_CLUSTER: &str = "clusterA";
pub const CLUSTER_B: &str = "clusterB";
pub const CLUSTER_C: &str = "clusterC";

pub fn test_service_config() -> ServiceConfig {
    ServiceConfig {
        local_cluster_name: LOCAL_CLUSTER.to_string(),
        known_clusters: vec![CLUSTER_B.to_string(), CLUSTER_C.to_string()],
        ..ServiceConfig::default()
    }
}

pub fn memory_registry() -> Arc<MovementRegistry> {
    Arc::new(MovementRegistry::new(
        Arc::new(MemoryKeyValueStore::new()),
        &RegistryConfig::default(),
    ))
}

/// A running balancer on an in-memory store with a controllable pipeline
/// and peer-failure signal
pub struct BalancerHarness {
    pub handle: BalancerHandle,
    pub reporter: PipelineReporter,
    pub context: Arc<BalancerContext>,
    pub data_mover: Arc<InMemoryDataMover>,
    pub peer: PeerFailureSignal,
    pub service: JoinHandle<BalancerResult<ServiceExit>>,
}

impl BalancerHarness {
    pub fn start() -> Self {
        Self::start_with(test_service_config())
    }

    pub fn start_with(service_config: ServiceConfig) -> Self {
        let data_mover = Arc::new(InMemoryDataMover::new());
        let context = Arc::new(BalancerContext::new(
            memory_registry(),
            data_mover.clone(),
            service_config,
        ));
        let (monitor, peer) = WatchFailureMonitor::new();
        let (dispatcher, handle, reporter) =
            RequestDispatcher::new(Arc::clone(&context), Arc::new(monitor));
        let service = tokio::spawn(dispatcher.run());

        Self {
            handle,
            reporter,
            context,
            data_mover,
            peer,
            service,
        }
    }

    /// Halt the service and return how it stopped
    pub async fn shutdown(self) -> ServiceExit {
        let requester_id = uuid::Uuid::new_v4();
        self.handle.halt(requester_id).await.unwrap();
        self.service.await.unwrap().unwrap()
    }
}
