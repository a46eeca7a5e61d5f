use serde::{Deserialize, Serialize};

use super::states::AbortState;

/// Events that can trigger movement state transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MovementEvent {
    /// Pipeline began copying data
    Start,
    /// Destination caught up at the chosen cutover version
    ReadyForSwitch { switch_version: u64 },
    /// Cutover began
    BeginSwitch,
    /// Destination is authoritative
    Complete,
    /// Pipeline failed with the given reason
    Fail(String),
    /// Client asked to abort the movement
    RequestAbort,
    /// Abort settled with the given outcome
    ResolveAbort(AbortState),
    /// Record the cutover version without changing state
    SetSwitchVersion(u64),
}

impl MovementEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ReadyForSwitch { .. } => "ready_for_switch",
            Self::BeginSwitch => "begin_switch",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::RequestAbort => "request_abort",
            Self::ResolveAbort(_) => "resolve_abort",
            Self::SetSwitchVersion(_) => "set_switch_version",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// Events that move `state` rather than the abort sub-state or the switch version
    pub fn changes_state(&self) -> bool {
        matches!(
            self,
            Self::Start
                | Self::ReadyForSwitch { .. }
                | Self::BeginSwitch
                | Self::Complete
                | Self::Fail(_)
        )
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}
