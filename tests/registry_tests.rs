//! Registry behavior against the in-memory transactional store.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::memory_registry;
use tenant_balancer::config::RegistryConfig;
use tenant_balancer::error::BalancerError;
use tenant_balancer::models::MovementRecord;
use tenant_balancer::registry::MovementRegistry;
use tenant_balancer::state_machine::{
    AbortState, MovementEvent, MovementState, MovementStateMachine, StateMachineResult,
};
use tenant_balancer::storage::MemoryKeyValueStore;

fn apply(event: MovementEvent) -> impl FnMut(&mut MovementRecord) -> StateMachineResult<()> + Send {
    move |record| {
        MovementStateMachine::new(record).transition(event.clone())?;
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_allow_one_active_movement_per_tenant() {
    let registry = memory_registry();

    let mut tasks = Vec::new();
    for attempt in 0..16 {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            let destination = if attempt % 2 == 0 { "clusterB" } else { "clusterC" };
            registry.create("tenantA", destination).await
        }));
    }

    let mut created = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Ok(id) => created.push(id),
            Err(BalancerError::AlreadyInProgress { tenant_name, .. }) => {
                assert_eq!(tenant_name, "tenantA");
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(created.len(), 1, "exactly one create must win");
    let active = registry.list().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, created[0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_for_distinct_tenants_all_succeed() {
    // Every create bumps the shared sequence key, so losers retry
    let registry = Arc::new(MovementRegistry::new(
        Arc::new(MemoryKeyValueStore::new()),
        &RegistryConfig {
            max_transaction_retries: 64,
            retry_backoff_ms: 1,
            ..RegistryConfig::default()
        },
    ));

    let mut tasks = Vec::new();
    for tenant in 0..12 {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            registry.create(&format!("tenant{tenant}"), "clusterB").await
        }));
    }

    let mut ids = HashSet::new();
    for task in tasks {
        ids.insert(task.await.unwrap().unwrap());
    }
    assert_eq!(ids.len(), 12);

    let all = registry.list_all().await.unwrap();
    let sequences: Vec<u64> = all.iter().map(|record| record.sequence).collect();
    assert_eq!(sequences, (1..=12).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_switch_version_cannot_be_changed_once_switching() {
    let registry = memory_registry();
    let id = registry.create("tenantA", "clusterB").await.unwrap();

    for event in [
        MovementEvent::Start,
        MovementEvent::ReadyForSwitch {
            switch_version: 100,
        },
        MovementEvent::BeginSwitch,
    ] {
        registry.update(id, apply(event)).await.unwrap();
    }

    let record = registry.get(id).await.unwrap();
    assert_eq!(record.state, MovementState::Switching);
    assert_eq!(record.switch_version, Some(100));

    let result = registry
        .update(id, apply(MovementEvent::SetSwitchVersion(200)))
        .await;
    assert!(matches!(result, Err(BalancerError::Conflict(_))));

    // Same value again is a no-op
    registry
        .update(id, apply(MovementEvent::SetSwitchVersion(100)))
        .await
        .unwrap();
    assert_eq!(registry.get(id).await.unwrap().switch_version, Some(100));
}

#[tokio::test]
async fn test_rejected_update_leaves_record_untouched() {
    let registry = memory_registry();
    let id = registry.create("tenantA", "clusterB").await.unwrap();
    let before = registry.get(id).await.unwrap();

    let result = registry.update(id, apply(MovementEvent::Complete)).await;
    assert!(matches!(result, Err(BalancerError::Conflict(_))));
    assert_eq!(registry.get(id).await.unwrap(), before);
}

#[tokio::test]
async fn test_rolled_back_movement_frees_the_tenant() {
    let registry = memory_registry();
    let first = registry.create("tenantA", "clusterB").await.unwrap();

    registry
        .update(first, apply(MovementEvent::RequestAbort))
        .await
        .unwrap();
    // Still active until the abort resolves
    assert!(matches!(
        registry.create("tenantA", "clusterC").await,
        Err(BalancerError::AlreadyInProgress { movement_id, .. }) if movement_id == first
    ));

    registry
        .update(first, apply(MovementEvent::ResolveAbort(AbortState::RolledBack)))
        .await
        .unwrap();
    assert!(registry.get_active_by_tenant("tenantA").await.unwrap().is_none());
    let second = registry.create("tenantA", "clusterC").await.unwrap();
    assert_ne!(first, second);

    assert_eq!(
        registry.get_active_by_tenant("tenantA").await.unwrap().unwrap().id,
        second
    );
    // The tenant index follows the newest movement; the old one is kept
    assert_eq!(
        registry.get_by_tenant("tenantA").await.unwrap().unwrap().id,
        second
    );
    let rolled_back = registry.get(first).await.unwrap();
    assert_eq!(rolled_back.abort_state, Some(AbortState::RolledBack));
    assert_eq!(registry.list_all().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_remove_only_finished_movements() {
    let registry = memory_registry();
    let id = registry.create("tenantA", "clusterB").await.unwrap();

    assert!(matches!(
        registry.remove(id).await,
        Err(BalancerError::Conflict(_))
    ));

    registry
        .update(id, apply(MovementEvent::fail_with_error("copy failed")))
        .await
        .unwrap();
    registry.remove(id).await.unwrap();

    assert!(matches!(
        registry.get(id).await,
        Err(BalancerError::NotFound(_))
    ));
    assert!(registry.get_by_tenant("tenantA").await.unwrap().is_none());
}
