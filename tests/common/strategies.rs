use proptest::prelude::*;

use tenant_balancer::models::{MovementId, MovementRecord};
use tenant_balancer::state_machine::{AbortState, MovementEvent};

/// Strategy for generating arbitrary movement identifiers
pub fn movement_id_strategy() -> impl Strategy<Value = MovementId> {
    (any::<u64>(), any::<u64>()).prop_map(|(first, second)| MovementId::new(first, second))
}

/// Strategy for generating tenant names
pub fn tenant_name_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9_-]{0,31}"
}

pub fn cluster_name_strategy() -> impl Strategy<Value = String> {
    "cluster[A-Z][a-z0-9]{0,8}"
}

/// Strategy for generating freshly created movement records
pub fn movement_record_strategy() -> impl Strategy<Value = MovementRecord> {
    (
        movement_id_strategy(),
        tenant_name_strategy(),
        cluster_name_strategy(),
        1u64..1_000_000,
    )
        .prop_map(|(id, tenant, cluster, sequence)| {
            MovementRecord::new(id, tenant, cluster, sequence)
        })
}

/// Strategy for generating a single lifecycle event, legal or not
pub fn movement_event_strategy() -> impl Strategy<Value = MovementEvent> {
    prop_oneof![
        Just(MovementEvent::Start),
        (1u64..=3).prop_map(|switch_version| MovementEvent::ReadyForSwitch { switch_version }),
        Just(MovementEvent::BeginSwitch),
        Just(MovementEvent::Complete),
        "[a-z ]{1,16}".prop_map(MovementEvent::Fail),
        Just(MovementEvent::RequestAbort),
        prop_oneof![
            Just(AbortState::Unknown),
            Just(AbortState::RolledBack),
            Just(AbortState::Completed),
        ]
        .prop_map(MovementEvent::ResolveAbort),
        (1u64..=3).prop_map(MovementEvent::SetSwitchVersion),
    ]
}

/// Strategy for generating event sequences fed to one movement
pub fn movement_event_sequence_strategy() -> impl Strategy<Value = Vec<MovementEvent>> {
    prop::collection::vec(movement_event_strategy(), 0..24)
}
