use super::errors::{business_rule_violation, GuardError, GuardResult};
use super::states::{AbortState, MovementState};
use crate::models::MovementRecord;

/// Trait for implementing state transition guards
pub trait StateGuard<T> {
    /// Check if a transition is allowed
    fn check(&self, entity: &T) -> GuardResult<()>;

    /// Get a description of this guard for logging
    fn description(&self) -> &'static str;
}

/// Forward progress is frozen once an abort rolled the movement back
pub struct NotRolledBackGuard;

impl StateGuard<MovementRecord> for NotRolledBackGuard {
    fn check(&self, record: &MovementRecord) -> GuardResult<()> {
        if record.abort_state == Some(AbortState::RolledBack) {
            return Err(business_rule_violation(format!(
                "Movement {} was rolled back by an abort",
                record.id
            )));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Movement must not be rolled back"
    }
}

/// An abort requested before the cutover keeps the cutover from starting, so
/// it can only settle as ROLLED_BACK
pub struct NoPendingAbortGuard;

impl StateGuard<MovementRecord> for NoPendingAbortGuard {
    fn check(&self, record: &MovementRecord) -> GuardResult<()> {
        if record.abort_state == Some(AbortState::Unknown) && !record.has_reached_switch() {
            return Err(business_rule_violation(format!(
                "Movement {} has an abort pending from {}; the switch may not begin",
                record.id, record.state
            )));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Switch may not begin while a pre-switch abort is pending"
    }
}

/// Aborts are accepted until the movement completed or failed
pub struct AbortAllowedGuard;

impl StateGuard<MovementRecord> for AbortAllowedGuard {
    fn check(&self, record: &MovementRecord) -> GuardResult<()> {
        // An abort already on record is answered, not re-evaluated
        if record.abort_state.is_some() {
            return Ok(());
        }
        if record.state.is_terminal() {
            return Err(GuardError::InvalidState {
                state: format!(
                    "Movement {} is {} and can no longer be aborted",
                    record.id, record.state
                ),
            });
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Movement must not be completed or failed to accept an abort"
    }
}

/// An abort settles once, to the outcome dictated by how far the cutover got
pub struct AbortResolutionGuard {
    pub outcome: AbortState,
}

impl StateGuard<MovementRecord> for AbortResolutionGuard {
    fn check(&self, record: &MovementRecord) -> GuardResult<()> {
        match record.abort_state {
            None => {
                return Err(business_rule_violation(format!(
                    "Movement {} has no abort to resolve",
                    record.id
                )))
            }
            Some(current) if current == self.outcome => return Ok(()),
            Some(AbortState::Unknown) => {}
            Some(current) => {
                return Err(business_rule_violation(format!(
                    "Abort of movement {} already resolved as {current}",
                    record.id
                )))
            }
        }

        let expected = abort_outcome_for(record);
        if self.outcome != expected {
            return Err(business_rule_violation(format!(
                "Abort of movement {} in state {} must resolve as {expected}, not {}",
                record.id, record.state, self.outcome
            )));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Abort must be pending and resolve to the outcome its state allows"
    }
}

/// The switch version is chosen once, at or after READY_FOR_SWITCH
pub struct SwitchVersionGuard {
    pub requested: u64,
    pub target_state: MovementState,
}

impl StateGuard<MovementRecord> for SwitchVersionGuard {
    fn check(&self, record: &MovementRecord) -> GuardResult<()> {
        if !self.target_state.allows_switch_version() {
            return Err(GuardError::InvalidState {
                state: format!(
                    "Switch version {} cannot be set while movement {} is {}",
                    self.requested, record.id, self.target_state
                ),
            });
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Switch version may only be set from READY_FOR_SWITCH onwards"
    }
}

/// Outcome an abort settles to, given how far the movement got
pub fn abort_outcome_for(record: &MovementRecord) -> AbortState {
    if record.has_reached_switch() {
        AbortState::Completed
    } else {
        AbortState::RolledBack
    }
}
