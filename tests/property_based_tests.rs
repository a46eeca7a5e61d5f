mod common;

use common::strategies::*;
use proptest::prelude::*;

use tenant_balancer::models::MovementRecord;
use tenant_balancer::registry::codec::{
    decode_movement_id, decode_record, encode_movement_id, encode_record,
};
use tenant_balancer::state_machine::{AbortState, MovementState, MovementStateMachine};

proptest! {
    /// Property: encoded ids sort the same way the ids do, so key scans come back in id order
    #[test]
    fn movement_id_encoding_preserves_order(a in movement_id_strategy(), b in movement_id_strategy()) {
        let (ea, eb) = (encode_movement_id(&a), encode_movement_id(&b));
        prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
        prop_assert_eq!(decode_movement_id(&ea).unwrap(), a);
    }

    /// Property: stored records decode to exactly what was written
    #[test]
    fn stored_records_decode_unchanged(record in movement_record_strategy()) {
        let bytes = encode_record(&record).unwrap();
        prop_assert_eq!(decode_record(&bytes).unwrap(), record);
    }

    /// Property: no event sequence can skip a lifecycle state or leave a terminal one
    #[test]
    fn history_only_moves_one_step_or_to_error(
        mut record in movement_record_strategy(),
        events in movement_event_sequence_strategy(),
    ) {
        let mut state_machine = MovementStateMachine::new(&mut record);
        for event in events {
            let _ = state_machine.transition(event);
        }

        let mut expected_from = MovementState::Initializing;
        for transition in &record.history {
            prop_assert_eq!(transition.from, expected_from);
            prop_assert!(!transition.from.is_terminal());
            prop_assert!(
                transition.to == MovementState::Error || Some(transition.to) == transition.from.next(),
                "illegal step {} -> {}", transition.from, transition.to
            );
            expected_from = transition.to;
        }
        prop_assert_eq!(record.state, expected_from);
    }

    /// Property: switch version and resolved aborts never change once written, and
    /// an abort requested before the cutover never lets the cutover start
    #[test]
    fn write_once_fields_stay_fixed(
        mut record in movement_record_strategy(),
        events in movement_event_sequence_strategy(),
    ) {
        let mut switch_version = None;
        let mut abort_state: Option<AbortState> = None;
        let mut rolled_back_state = None;
        let mut aborted_before_switch = false;

        for event in events {
            let _ = MovementStateMachine::new(&mut record).transition(event);

            if let Some(previous) = switch_version {
                prop_assert_eq!(record.switch_version, Some(previous));
            }
            switch_version = record.switch_version;

            match abort_state {
                Some(previous) if previous.is_resolved() => {
                    prop_assert_eq!(record.abort_state, Some(previous));
                }
                Some(_) => prop_assert!(record.abort_state.is_some()),
                None => {}
            }
            abort_state = record.abort_state;

            if let Some(state) = rolled_back_state {
                prop_assert_eq!(record.state, state);
            }
            if record.abort_state == Some(AbortState::RolledBack) {
                prop_assert!(!record.has_reached_switch());
                rolled_back_state = Some(record.state);
            }

            if record.abort_state.is_some() && !record.has_reached_switch() {
                aborted_before_switch = true;
            }
            if aborted_before_switch {
                prop_assert!(!record.has_reached_switch());
                prop_assert_ne!(record.abort_state, Some(AbortState::Completed));
            }
        }

        if record.switch_version.is_some() {
            prop_assert!(record.history.iter().any(|t| t.to == MovementState::ReadyForSwitch));
        }
    }
}

#[test]
fn test_fresh_record_is_active() {
    let record = MovementRecord::new(
        tenant_balancer::models::MovementId::generate(),
        "tenantA",
        "clusterB",
        1,
    );
    assert!(record.is_active());
    assert!(record.history.is_empty());
}
