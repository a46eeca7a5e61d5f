//! # Movement Model
//!
//! Identity and durable record of one tenant movement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::state_machine::states::{AbortState, MovementState};

/// Globally unique 128-bit movement identifier.
///
/// Stored as two 64-bit halves. The storage encoding lives in
/// [`crate::registry::codec`]; this type never relies on its in-memory layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Uuid", into = "Uuid")]
pub struct MovementId {
    first: u64,
    second: u64,
}

impl MovementId {
    pub const fn new(first: u64, second: u64) -> Self {
        Self { first, second }
    }

    /// Allocate a fresh, time-ordered identifier
    pub fn generate() -> Self {
        Uuid::now_v7().into()
    }

    pub fn first(&self) -> u64 {
        self.first
    }

    pub fn second(&self) -> u64 {
        self.second
    }

    /// First half as hex, for compact log fields
    pub fn short_string(&self) -> String {
        format!("{:016x}", self.first)
    }

    pub fn as_uuid(&self) -> Uuid {
        Uuid::from_u64_pair(self.first, self.second)
    }
}

impl From<Uuid> for MovementId {
    fn from(uuid: Uuid) -> Self {
        let (first, second) = uuid.as_u64_pair();
        Self { first, second }
    }
}

impl From<MovementId> for Uuid {
    fn from(id: MovementId) -> Self {
        id.as_uuid()
    }
}

impl fmt::Display for MovementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_uuid())
    }
}

impl FromStr for MovementId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self::from)
            .map_err(|e| format!("Invalid movement id {s}: {e}"))
    }
}

/// One applied state change, kept as the movement's audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementTransition {
    pub from: MovementState,
    pub to: MovementState,
    pub at: DateTime<Utc>,
}

/// Durable record of a movement, owned by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: MovementId,
    pub tenant_name: String,
    pub destination_cluster: String,
    pub state: MovementState,
    #[serde(default)]
    pub abort_state: Option<AbortState>,
    #[serde(default)]
    pub switch_version: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    /// Registry-assigned insertion order
    pub sequence: u64,
    #[serde(default)]
    pub history: Vec<MovementTransition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MovementRecord {
    /// New record in the initial state
    pub fn new(
        id: MovementId,
        tenant_name: impl Into<String>,
        destination_cluster: impl Into<String>,
        sequence: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            tenant_name: tenant_name.into(),
            destination_cluster: destination_cluster.into(),
            state: MovementState::default(),
            abort_state: None,
            switch_version: None,
            error: None,
            sequence,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A movement blocks new movements for its tenant until it reaches a
    /// terminal state or its abort has rolled it back.
    pub fn is_active(&self) -> bool {
        !self.state.is_terminal() && self.abort_state != Some(AbortState::RolledBack)
    }

    /// Whether the cutover has begun at any point in this movement's life
    pub fn has_reached_switch(&self) -> bool {
        self.state.has_reached_switch()
            || self.history.iter().any(|t| t.to.has_reached_switch())
    }

    pub fn info(&self) -> TenantMovementInfo {
        TenantMovementInfo {
            movement_id: self.id,
            tenant_name: self.tenant_name.clone(),
            destination_cluster: self.destination_cluster.clone(),
        }
    }

    /// Fields that may never change after creation
    pub(crate) fn identity(&self) -> (MovementId, &str, &str, u64) {
        (
            self.id,
            &self.tenant_name,
            &self.destination_cluster,
            self.sequence,
        )
    }
}

/// Entry of the active-movements listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMovementInfo {
    pub movement_id: MovementId,
    pub tenant_name: String,
    pub destination_cluster: String,
}
