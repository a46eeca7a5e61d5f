use serde::{Deserialize, Serialize};
use std::fmt;

/// Movement lifecycle states, in forward order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementState {
    /// Record created, pipeline not yet running
    Initializing,
    /// Pipeline is copying data to the destination
    Started,
    /// Destination caught up; a switch version has been chosen
    ReadyForSwitch,
    /// Cutover to the destination is under way
    Switching,
    /// Destination is authoritative
    Completed,
    /// Pipeline reported an unrecoverable failure
    Error,
}

impl MovementState {
    /// Forward path, excluding the error sink
    pub const FORWARD: [MovementState; 5] = [
        Self::Initializing,
        Self::Started,
        Self::ReadyForSwitch,
        Self::Switching,
        Self::Completed,
    ];

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// Position along the forward path; `None` for the error sink
    pub fn position(&self) -> Option<usize> {
        Self::FORWARD.iter().position(|state| state == self)
    }

    /// The single legal forward successor
    pub fn next(&self) -> Option<MovementState> {
        self.position()
            .and_then(|index| Self::FORWARD.get(index + 1).copied())
    }

    /// True once the cutover has begun; data can no longer be discarded
    pub fn has_reached_switch(&self) -> bool {
        matches!(self, Self::Switching | Self::Completed)
    }

    /// States that may carry a switch version
    pub fn allows_switch_version(&self) -> bool {
        matches!(
            self,
            Self::ReadyForSwitch | Self::Switching | Self::Completed
        )
    }
}

impl fmt::Display for MovementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Started => write!(f, "started"),
            Self::ReadyForSwitch => write!(f, "ready_for_switch"),
            Self::Switching => write!(f, "switching"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for MovementState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initializing" => Ok(Self::Initializing),
            "started" => Ok(Self::Started),
            "ready_for_switch" => Ok(Self::ReadyForSwitch),
            "switching" => Ok(Self::Switching),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid movement state: {s}")),
        }
    }
}

impl Default for MovementState {
    fn default() -> Self {
        Self::Initializing
    }
}

/// Abort sub-state, tracked alongside [`MovementState`] once an abort is requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortState {
    /// Abort requested, outcome not yet settled
    Unknown,
    /// Destination data discarded; the tenant stays on the source
    RolledBack,
    /// Cutover had already begun; the movement finishes and the abort is a confirmation
    Completed,
}

impl AbortState {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for AbortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::RolledBack => write!(f, "rolled_back"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for AbortState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "rolled_back" => Ok(Self::RolledBack),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid abort state: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movement_state_terminal_check() {
        assert!(MovementState::Completed.is_terminal());
        assert!(MovementState::Error.is_terminal());
        assert!(!MovementState::Initializing.is_terminal());
        assert!(!MovementState::Started.is_terminal());
        assert!(!MovementState::ReadyForSwitch.is_terminal());
        assert!(!MovementState::Switching.is_terminal());
    }

    #[test]
    fn test_forward_successors() {
        assert_eq!(
            MovementState::Initializing.next(),
            Some(MovementState::Started)
        );
        assert_eq!(
            MovementState::Switching.next(),
            Some(MovementState::Completed)
        );
        assert_eq!(MovementState::Completed.next(), None);
        assert_eq!(MovementState::Error.next(), None);
        assert_eq!(MovementState::Error.position(), None);
    }

    #[test]
    fn test_state_string_conversion() {
        assert_eq!(MovementState::ReadyForSwitch.to_string(), "ready_for_switch");
        assert_eq!(
            "switching".parse::<MovementState>().unwrap(),
            MovementState::Switching
        );
        assert_eq!(AbortState::RolledBack.to_string(), "rolled_back");
        assert_eq!(
            "completed".parse::<AbortState>().unwrap(),
            AbortState::Completed
        );
        assert!("paused".parse::<MovementState>().is_err());
    }

    #[test]
    fn test_state_serde() {
        let state = MovementState::ReadyForSwitch;
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, "\"ready_for_switch\"");

        let parsed: MovementState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn test_abort_resolution() {
        assert!(!AbortState::Unknown.is_resolved());
        assert!(AbortState::RolledBack.is_resolved());
        assert!(AbortState::Completed.is_resolved());
    }
}
