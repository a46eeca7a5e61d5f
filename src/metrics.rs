//! # Balancer Metrics
//!
//! Per-request-kind counters owned by one balancer instance. Each counter keeps
//! an in-process value for [`BalancerMetrics::snapshot`] and mirrors every
//! increment to an OpenTelemetry instrument.
//!
//! Labels on every instrument:
//! - balancer_id: Owning balancer instance
//! - request_kind: `get_movement_status`, `get_active_movements`,
//!   `move_tenants_to_cluster`, `abort_movement`

use dashmap::DashMap;
use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use uuid::Uuid;

use crate::constants::METER_NAME;
use crate::error::BalancerError;

/// Lazy-initialized meter for balancer metrics
static BALANCER_METER: OnceLock<Meter> = OnceLock::new();

fn meter() -> &'static Meter {
    BALANCER_METER.get_or_init(|| opentelemetry::global::meter(METER_NAME))
}

/// Client request kinds, one counter each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    GetMovementStatus,
    GetActiveMovements,
    MoveTenantsToCluster,
    AbortMovement,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetMovementStatus => "get_movement_status",
            Self::GetActiveMovements => "get_active_movements",
            Self::MoveTenantsToCluster => "move_tenants_to_cluster",
            Self::AbortMovement => "abort_movement",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counter with a locally readable value
struct MirroredCounter {
    value: AtomicU64,
    instrument: Counter<u64>,
}

impl MirroredCounter {
    fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            value: AtomicU64::new(0),
            instrument: meter()
                .u64_counter(name)
                .with_description(description)
                .build(),
        }
    }

    fn increment(&self, attributes: &[KeyValue]) {
        self.value.fetch_add(1, Ordering::Relaxed);
        self.instrument.add(1, attributes);
    }

    fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

pub struct BalancerMetrics {
    balancer_id: Uuid,
    get_movement_status_requests: MirroredCounter,
    get_active_movements_requests: MirroredCounter,
    move_tenants_to_cluster_requests: MirroredCounter,
    abort_movement_requests: MirroredCounter,
    pipeline_events_applied: MirroredCounter,
    failed_requests: Counter<u64>,
    failures_by_kind: DashMap<&'static str, u64>,
}

impl fmt::Debug for BalancerMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BalancerMetrics")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl BalancerMetrics {
    pub fn new(balancer_id: Uuid) -> Self {
        Self {
            balancer_id,
            get_movement_status_requests: MirroredCounter::new(
                "tenant_balancer.requests.get_movement_status",
                "Movement status requests received",
            ),
            get_active_movements_requests: MirroredCounter::new(
                "tenant_balancer.requests.get_active_movements",
                "Active movement listings requested",
            ),
            move_tenants_to_cluster_requests: MirroredCounter::new(
                "tenant_balancer.requests.move_tenants_to_cluster",
                "Tenant movement requests received",
            ),
            abort_movement_requests: MirroredCounter::new(
                "tenant_balancer.requests.abort_movement",
                "Movement abort requests received",
            ),
            pipeline_events_applied: MirroredCounter::new(
                "tenant_balancer.pipeline.events_applied",
                "Pipeline progress reports applied to movement records",
            ),
            failed_requests: meter()
                .u64_counter("tenant_balancer.requests.failed")
                .with_description("Requests answered with an error")
                .build(),
            failures_by_kind: DashMap::new(),
        }
    }

    pub fn balancer_id(&self) -> Uuid {
        self.balancer_id
    }

    fn counter(&self, kind: RequestKind) -> &MirroredCounter {
        match kind {
            RequestKind::GetMovementStatus => &self.get_movement_status_requests,
            RequestKind::GetActiveMovements => &self.get_active_movements_requests,
            RequestKind::MoveTenantsToCluster => &self.move_tenants_to_cluster_requests,
            RequestKind::AbortMovement => &self.abort_movement_requests,
        }
    }

    /// Count a request on receipt
    pub fn record_request(&self, kind: RequestKind) {
        self.counter(kind).increment(&[
            KeyValue::new("balancer_id", self.balancer_id.to_string()),
            KeyValue::new("request_kind", kind.as_str()),
        ]);
    }

    pub fn record_failure(&self, kind: RequestKind, error: &BalancerError) {
        *self.failures_by_kind.entry(kind.as_str()).or_insert(0) += 1;
        self.failed_requests.add(
            1,
            &[
                KeyValue::new("balancer_id", self.balancer_id.to_string()),
                KeyValue::new("request_kind", kind.as_str()),
                KeyValue::new("error_kind", error.kind()),
            ],
        );
    }

    pub fn record_pipeline_event(&self, event_type: &'static str) {
        self.pipeline_events_applied.increment(&[
            KeyValue::new("balancer_id", self.balancer_id.to_string()),
            KeyValue::new("event_type", event_type),
        ]);
    }

    pub fn requests(&self, kind: RequestKind) -> u64 {
        self.counter(kind).get()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            balancer_id: self.balancer_id,
            get_movement_status_requests: self.get_movement_status_requests.get(),
            get_active_movements_requests: self.get_active_movements_requests.get(),
            move_tenants_to_cluster_requests: self.move_tenants_to_cluster_requests.get(),
            abort_movement_requests: self.abort_movement_requests.get(),
            pipeline_events_applied: self.pipeline_events_applied.get(),
            failed_requests: self
                .failures_by_kind
                .iter()
                .map(|entry| (entry.key().to_string(), *entry.value()))
                .collect(),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub balancer_id: Uuid,
    pub get_movement_status_requests: u64,
    pub get_active_movements_requests: u64,
    pub move_tenants_to_cluster_requests: u64,
    pub abort_movement_requests: u64,
    pub pipeline_events_applied: u64,
    /// Failed requests keyed by request kind
    pub failed_requests: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_counters_are_independent() {
        let metrics = BalancerMetrics::new(Uuid::new_v4());
        metrics.record_request(RequestKind::MoveTenantsToCluster);
        metrics.record_request(RequestKind::MoveTenantsToCluster);
        metrics.record_request(RequestKind::AbortMovement);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.move_tenants_to_cluster_requests, 2);
        assert_eq!(snapshot.abort_movement_requests, 1);
        assert_eq!(snapshot.get_movement_status_requests, 0);
        assert_eq!(metrics.requests(RequestKind::GetActiveMovements), 0);
    }

    #[test]
    fn test_failures_grouped_by_request_kind() {
        let metrics = BalancerMetrics::new(Uuid::new_v4());
        metrics.record_failure(
            RequestKind::GetMovementStatus,
            &BalancerError::not_found("tenant"),
        );
        metrics.record_failure(
            RequestKind::GetMovementStatus,
            &BalancerError::not_found("tenant"),
        );

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.failed_requests.get("get_movement_status"), Some(&2));
        assert_eq!(snapshot.failed_requests.len(), 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = BalancerMetrics::new(Uuid::nil());
        metrics.record_pipeline_event("start");
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["pipeline_events_applied"], 1);
    }
}
