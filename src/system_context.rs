use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::{BalancerConfig, ServiceConfig};
use crate::error::BalancerResult;
use crate::metrics::BalancerMetrics;
use crate::registry::MovementRegistry;
use crate::services::DataMover;
use crate::storage::build_store;

/// Shared dependencies of one balancer instance
///
/// This serves as a dependency injection container providing access to:
/// - Movement registry (durable state)
/// - Data-movement pipeline
/// - Per-instance metrics
/// - Service configuration
#[derive(Clone)]
pub struct BalancerContext {
    /// Balancer instance ID
    pub balancer_id: Uuid,

    pub registry: Arc<MovementRegistry>,

    pub data_mover: Arc<dyn DataMover>,

    pub metrics: Arc<BalancerMetrics>,

    pub service_config: ServiceConfig,
}

impl std::fmt::Debug for BalancerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalancerContext")
            .field("balancer_id", &self.balancer_id)
            .field("registry", &self.registry)
            .field("data_mover", &"Arc<dyn DataMover>")
            .field("metrics", &self.metrics)
            .field("service_config", &self.service_config)
            .finish()
    }
}

impl BalancerContext {
    pub fn new(
        registry: Arc<MovementRegistry>,
        data_mover: Arc<dyn DataMover>,
        service_config: ServiceConfig,
    ) -> Self {
        let balancer_id = service_config.balancer_id.unwrap_or_else(Uuid::new_v4);
        Self {
            balancer_id,
            registry,
            data_mover,
            metrics: Arc::new(BalancerMetrics::new(balancer_id)),
            service_config,
        }
    }

    /// Build the configured store and registry around `data_mover`
    pub async fn from_config(
        config: &BalancerConfig,
        data_mover: Arc<dyn DataMover>,
    ) -> BalancerResult<Self> {
        let store = build_store(&config.storage).await?;
        let registry = Arc::new(MovementRegistry::new(store, &config.registry));
        let context = Self::new(registry, data_mover, config.service.clone());

        info!(
            balancer_id = %context.balancer_id,
            local_cluster = %context.service_config.local_cluster_name,
            known_clusters = ?context.service_config.known_clusters,
            "✅ BALANCER: Context initialized"
        );
        Ok(context)
    }
}
