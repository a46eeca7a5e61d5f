use crate::models::{MovementRecord, PipelineTelemetry, TenantMovementStatus};

/// Assembles client-facing movement status from the durable record and
/// whatever the pipeline can currently measure.
pub struct StatusReporter;

impl StatusReporter {
    /// Pure; lag fields stay `None` when no measurement is available
    pub fn compute_status(
        record: &MovementRecord,
        telemetry: Option<&PipelineTelemetry>,
    ) -> TenantMovementStatus {
        TenantMovementStatus {
            movement_id: record.id,
            tenant_name: record.tenant_name.clone(),
            state: record.state,
            abort_state: record.abort_state,
            destination_version_lag: telemetry.and_then(|t| t.destination_version_lag),
            mutation_lag: telemetry.and_then(|t| t.mutation_lag),
            switch_version: record.switch_version,
        }
    }
}
