//! Point-in-time status of a movement, computed on demand and never persisted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::movement::MovementId;
use crate::state_machine::states::{AbortState, MovementState};

/// Lag measurements reported by the data-movement pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineTelemetry {
    /// Seconds the destination's committed version trails the source
    pub destination_version_lag: Option<f64>,
    /// Seconds of mutations captured but not yet applied at the destination
    pub mutation_lag: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantMovementStatus {
    pub movement_id: MovementId,
    pub tenant_name: String,
    pub state: MovementState,
    pub abort_state: Option<AbortState>,
    pub destination_version_lag: Option<f64>,
    pub mutation_lag: Option<f64>,
    pub switch_version: Option<u64>,
}

impl TenantMovementStatus {
    /// JSON document in the shape operators already consume. Absent
    /// measurements are left out rather than written as zero.
    pub fn to_json(&self) -> Value {
        let mut root = Map::new();
        root.insert(
            "movementId".to_string(),
            Value::String(self.movement_id.to_string()),
        );
        root.insert(
            "tenantName".to_string(),
            Value::String(self.tenant_name.clone()),
        );
        root.insert("state".to_string(), Value::String(self.state.to_string()));
        if let Some(abort_state) = self.abort_state {
            root.insert(
                "abortState".to_string(),
                Value::String(abort_state.to_string()),
            );
        }
        if let Some(lag) = self.destination_version_lag {
            root.insert("destinationDatabaseVersionLag".to_string(), Value::from(lag));
        }
        if let Some(lag) = self.mutation_lag {
            root.insert("mutationLag".to_string(), Value::from(lag));
        }
        if let Some(version) = self.switch_version {
            root.insert("switchVersion".to_string(), Value::from(version));
        }
        Value::Object(root)
    }
}
