use chrono::Utc;

use super::{
    errors::{StateMachineError, StateMachineResult},
    events::MovementEvent,
    guards::{
        abort_outcome_for, AbortAllowedGuard, AbortResolutionGuard, NoPendingAbortGuard,
        NotRolledBackGuard, StateGuard, SwitchVersionGuard,
    },
    states::{AbortState, MovementState},
};
use crate::models::{MovementRecord, MovementTransition};

/// Applies movement events to a record, enforcing transition legality.
///
/// The state machine borrows the record for the duration of one mutation; the
/// registry decides when the result is persisted.
pub struct MovementStateMachine<'a> {
    record: &'a mut MovementRecord,
}

impl<'a> MovementStateMachine<'a> {
    pub fn new(record: &'a mut MovementRecord) -> Self {
        Self { record }
    }

    pub fn current_state(&self) -> MovementState {
        self.record.state
    }

    pub fn abort_state(&self) -> Option<AbortState> {
        self.record.abort_state
    }

    /// Outcome an abort of this movement would settle to right now
    pub fn abort_outcome(&self) -> AbortState {
        abort_outcome_for(self.record)
    }

    /// Attempt to apply an event, returning the (possibly unchanged) state
    pub fn transition(&mut self, event: MovementEvent) -> StateMachineResult<MovementState> {
        match event {
            MovementEvent::RequestAbort => {
                self.request_abort()?;
            }
            MovementEvent::ResolveAbort(outcome) => {
                AbortResolutionGuard { outcome }.check(self.record)?;
                self.record.abort_state = Some(outcome);
            }
            MovementEvent::SetSwitchVersion(requested) => {
                NotRolledBackGuard.check(self.record)?;
                self.assign_switch_version(requested, self.record.state)?;
            }
            event => {
                self.advance(event)?;
            }
        }
        Ok(self.record.state)
    }

    /// Record an abort request. Already requested aborts are left untouched.
    fn request_abort(&mut self) -> StateMachineResult<AbortState> {
        AbortAllowedGuard
            .check(self.record)
            .map_err(|e| StateMachineError::AbortNotAllowed {
                reason: e.to_string(),
            })?;
        Ok(*self.record.abort_state.get_or_insert(AbortState::Unknown))
    }

    fn advance(&mut self, event: MovementEvent) -> StateMachineResult<()> {
        let current_state = self.record.state;
        let target_state = Self::determine_target_state(current_state, &event)?;

        NotRolledBackGuard.check(self.record)?;
        if target_state == MovementState::Switching {
            NoPendingAbortGuard.check(self.record)?;
        }
        if let MovementEvent::ReadyForSwitch { switch_version } = event {
            self.assign_switch_version(switch_version, target_state)?;
        }
        if let Some(reason) = event.error_message() {
            self.record.error = Some(reason.to_string());
        }

        self.record.state = target_state;
        self.record.history.push(MovementTransition {
            from: current_state,
            to: target_state,
            at: Utc::now(),
        });
        Ok(())
    }

    fn assign_switch_version(
        &mut self,
        requested: u64,
        target_state: MovementState,
    ) -> StateMachineResult<()> {
        SwitchVersionGuard {
            requested,
            target_state,
        }
        .check(self.record)?;

        match self.record.switch_version {
            Some(current) if current == requested => Ok(()),
            Some(current) => Err(StateMachineError::SwitchVersionImmutable { current, requested }),
            None => {
                self.record.switch_version = Some(requested);
                Ok(())
            }
        }
    }

    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: MovementState,
        event: &MovementEvent,
    ) -> StateMachineResult<MovementState> {
        let target = match (current_state, event) {
            // Forward path, one step at a time
            (MovementState::Initializing, MovementEvent::Start) => MovementState::Started,
            (MovementState::Started, MovementEvent::ReadyForSwitch { .. }) => {
                MovementState::ReadyForSwitch
            }
            (MovementState::ReadyForSwitch, MovementEvent::BeginSwitch) => {
                MovementState::Switching
            }
            (MovementState::Switching, MovementEvent::Complete) => MovementState::Completed,

            // Failure is reachable from every non-terminal state
            (from_state, MovementEvent::Fail(_)) if !from_state.is_terminal() => {
                MovementState::Error
            }

            // Invalid transitions
            (from_state, event) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MovementId;

    fn new_record() -> MovementRecord {
        MovementRecord::new(MovementId::generate(), "tenantA", "clusterB", 1)
    }

    fn drive(record: &mut MovementRecord, events: Vec<MovementEvent>) {
        let mut sm = MovementStateMachine::new(record);
        for event in events {
            sm.transition(event).unwrap();
        }
    }

    #[test]
    fn test_state_transitions() {
        assert_eq!(
            MovementStateMachine::determine_target_state(
                MovementState::Initializing,
                &MovementEvent::Start
            )
            .unwrap(),
            MovementState::Started
        );
        assert_eq!(
            MovementStateMachine::determine_target_state(
                MovementState::Started,
                &MovementEvent::ReadyForSwitch { switch_version: 5 }
            )
            .unwrap(),
            MovementState::ReadyForSwitch
        );
        assert_eq!(
            MovementStateMachine::determine_target_state(
                MovementState::Switching,
                &MovementEvent::fail_with_error("disk full")
            )
            .unwrap(),
            MovementState::Error
        );
    }

    #[test]
    fn test_invalid_transitions() {
        // Skipping a state is refused
        assert!(MovementStateMachine::determine_target_state(
            MovementState::Initializing,
            &MovementEvent::BeginSwitch
        )
        .is_err());

        // Nothing leaves a terminal state
        assert!(MovementStateMachine::determine_target_state(
            MovementState::Completed,
            &MovementEvent::fail_with_error("late")
        )
        .is_err());
        assert!(MovementStateMachine::determine_target_state(
            MovementState::Error,
            &MovementEvent::Start
        )
        .is_err());
    }

    #[test]
    fn test_full_forward_path_records_history() {
        let mut record = new_record();
        drive(
            &mut record,
            vec![
                MovementEvent::Start,
                MovementEvent::ReadyForSwitch {
                    switch_version: 100,
                },
                MovementEvent::BeginSwitch,
                MovementEvent::Complete,
            ],
        );

        assert_eq!(record.state, MovementState::Completed);
        assert_eq!(record.switch_version, Some(100));
        assert_eq!(record.history.len(), 4);
        assert!(record
            .history
            .iter()
            .all(|t| t.from.next() == Some(t.to)));
    }

    #[test]
    fn test_switch_version_is_immutable() {
        let mut record = new_record();
        drive(
            &mut record,
            vec![
                MovementEvent::Start,
                MovementEvent::ReadyForSwitch {
                    switch_version: 100,
                },
                MovementEvent::BeginSwitch,
            ],
        );

        let mut sm = MovementStateMachine::new(&mut record);
        assert_eq!(
            sm.transition(MovementEvent::SetSwitchVersion(200)),
            Err(StateMachineError::SwitchVersionImmutable {
                current: 100,
                requested: 200
            })
        );
        // Re-stating the same version is harmless
        assert!(sm.transition(MovementEvent::SetSwitchVersion(100)).is_ok());
        assert_eq!(record.switch_version, Some(100));
    }

    #[test]
    fn test_switch_version_refused_before_ready() {
        let mut record = new_record();
        let mut sm = MovementStateMachine::new(&mut record);
        assert!(sm.transition(MovementEvent::SetSwitchVersion(1)).is_err());
        assert_eq!(record.switch_version, None);
    }

    #[test]
    fn test_abort_before_switch_rolls_back_and_freezes() {
        let mut record = new_record();
        let mut sm = MovementStateMachine::new(&mut record);
        sm.transition(MovementEvent::RequestAbort).unwrap();
        assert_eq!(sm.abort_state(), Some(AbortState::Unknown));
        assert_eq!(sm.abort_outcome(), AbortState::RolledBack);

        // Completing the abort the wrong way is refused
        assert!(sm
            .transition(MovementEvent::ResolveAbort(AbortState::Completed))
            .is_err());
        sm.transition(MovementEvent::ResolveAbort(AbortState::RolledBack))
            .unwrap();

        assert!(sm.transition(MovementEvent::Start).is_err());
        assert_eq!(record.state, MovementState::Initializing);
        assert!(!record.is_active());
    }

    #[test]
    fn test_pending_abort_holds_the_cutover() {
        let mut record = new_record();
        drive(
            &mut record,
            vec![
                MovementEvent::Start,
                MovementEvent::RequestAbort,
                MovementEvent::ReadyForSwitch { switch_version: 9 },
            ],
        );

        let mut sm = MovementStateMachine::new(&mut record);
        assert!(matches!(
            sm.transition(MovementEvent::BeginSwitch),
            Err(StateMachineError::GuardFailed { .. })
        ));
        assert_eq!(sm.current_state(), MovementState::ReadyForSwitch);
        assert_eq!(sm.abort_outcome(), AbortState::RolledBack);
        assert!(sm
            .transition(MovementEvent::ResolveAbort(AbortState::Completed))
            .is_err());
        sm.transition(MovementEvent::ResolveAbort(AbortState::RolledBack))
            .unwrap();
        assert!(!record.has_reached_switch());
    }

    #[test]
    fn test_abort_during_switch_confirms_completion() {
        let mut record = new_record();
        drive(
            &mut record,
            vec![
                MovementEvent::Start,
                MovementEvent::ReadyForSwitch { switch_version: 9 },
                MovementEvent::BeginSwitch,
                MovementEvent::RequestAbort,
            ],
        );
        let mut sm = MovementStateMachine::new(&mut record);
        assert_eq!(sm.abort_outcome(), AbortState::Completed);
        sm.transition(MovementEvent::ResolveAbort(AbortState::Completed))
            .unwrap();

        // The movement still finishes
        sm.transition(MovementEvent::Complete).unwrap();
        assert_eq!(record.state, MovementState::Completed);
    }

    #[test]
    fn test_abort_refused_after_completion() {
        let mut record = new_record();
        drive(
            &mut record,
            vec![
                MovementEvent::Start,
                MovementEvent::ReadyForSwitch { switch_version: 9 },
                MovementEvent::BeginSwitch,
                MovementEvent::Complete,
            ],
        );
        let mut sm = MovementStateMachine::new(&mut record);
        assert!(matches!(
            sm.transition(MovementEvent::RequestAbort),
            Err(StateMachineError::AbortNotAllowed { .. })
        ));
    }

    #[test]
    fn test_repeated_abort_request_is_idempotent() {
        let mut record = new_record();
        drive(
            &mut record,
            vec![
                MovementEvent::RequestAbort,
                MovementEvent::ResolveAbort(AbortState::RolledBack),
            ],
        );
        let before = record.clone();

        let mut sm = MovementStateMachine::new(&mut record);
        sm.transition(MovementEvent::RequestAbort).unwrap();
        sm.transition(MovementEvent::ResolveAbort(AbortState::RolledBack))
            .unwrap();
        assert_eq!(record, before);
    }

    #[test]
    fn test_failure_keeps_reason() {
        let mut record = new_record();
        drive(
            &mut record,
            vec![
                MovementEvent::Start,
                MovementEvent::fail_with_error("destination unreachable"),
            ],
        );
        assert_eq!(record.state, MovementState::Error);
        assert_eq!(record.error.as_deref(), Some("destination unreachable"));
        assert!(!record.is_active());
    }
}
