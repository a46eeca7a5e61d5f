//! Per-request work spawned by the dispatcher.
//!
//! Every handler answers its own caller. A handler's task only returns an
//! error when that error must stop the whole service.

use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::commands::{CommandResponder, MovementCommand};
use crate::error::{BalancerError, BalancerResult};
use crate::logging::{log_error, log_movement_operation};
use crate::metrics::RequestKind;
use crate::protocol::{
    AbortMovementReply, AbortMovementRequest, GetActiveMovementsReply, GetMovementStatusReply,
    GetMovementStatusRequest, MoveTenantsToClusterReply, MoveTenantsToClusterRequest,
};
use crate::services::{PipelineEvent, StatusReporter};
use crate::state_machine::{
    abort_outcome_for, AbortState, MovementEvent, MovementStateMachine,
};
use crate::system_context::BalancerContext;

/// Count the request and hand it to its own task
pub(crate) fn spawn_command(
    tasks: &mut JoinSet<BalancerResult<()>>,
    context: Arc<BalancerContext>,
    command: MovementCommand,
) {
    let kind = command.kind();
    context.metrics.record_request(kind);
    debug!(request_kind = %kind, "Dispatching request");

    match command {
        MovementCommand::GetMovementStatus { request, resp } => {
            tasks.spawn(async move {
                let result = get_movement_status(&context, request).await;
                respond(&context, kind, resp, result)
            });
        }
        MovementCommand::GetActiveMovements { resp, .. } => {
            tasks.spawn(async move {
                let result = get_active_movements(&context).await;
                respond(&context, kind, resp, result)
            });
        }
        MovementCommand::MoveTenantsToCluster { request, resp } => {
            tasks.spawn(async move {
                let result = move_tenants_to_cluster(&context, request).await;
                respond(&context, kind, resp, result)
            });
        }
        MovementCommand::AbortMovement { request, resp } => {
            tasks.spawn(async move {
                let result = abort_movement(&context, request).await;
                respond(&context, kind, resp, result)
            });
        }
    }
}

/// Send the result to the caller; escalate faults that are not the caller's
fn respond<T>(
    context: &BalancerContext,
    kind: RequestKind,
    resp: CommandResponder<T>,
    result: BalancerResult<T>,
) -> BalancerResult<()> {
    let escalation = match &result {
        Ok(_) => None,
        Err(error) => {
            context.metrics.record_failure(kind, error);
            if error.is_client_visible() {
                debug!(request_kind = %kind, error = %error, "Request failed");
                None
            } else {
                log_error("request_dispatcher", kind.as_str(), &error.to_string(), None);
                Some(error.clone())
            }
        }
    };

    if resp.send(result).is_err() {
        debug!(request_kind = %kind, "Caller went away before the reply");
    }

    match escalation {
        Some(fault) => Err(fault),
        None => Ok(()),
    }
}

async fn move_tenants_to_cluster(
    context: &BalancerContext,
    request: MoveTenantsToClusterRequest,
) -> BalancerResult<MoveTenantsToClusterReply> {
    let MoveTenantsToClusterRequest {
        tenant_name,
        destination_cluster,
    } = request;
    let service = &context.service_config;

    if tenant_name.trim().is_empty() {
        return Err(BalancerError::invalid_input("tenant name must not be empty"));
    }
    if destination_cluster == service.local_cluster_name {
        return Err(BalancerError::invalid_input(format!(
            "tenant {tenant_name} already lives on {destination_cluster}"
        )));
    }
    if !service.is_known_cluster(&destination_cluster) {
        return Err(BalancerError::invalid_input(format!(
            "unknown destination cluster {destination_cluster}"
        )));
    }

    let record = context
        .registry
        .create_record(&tenant_name, &destination_cluster)
        .await?;
    log_movement_operation(
        "create",
        Some(&record.id),
        Some(&tenant_name),
        "initializing",
        Some(&destination_cluster),
    );

    if let Err(pipeline_error) = context.data_mover.start_movement(&record).await {
        let reason = pipeline_error.to_string();
        let marked = context
            .registry
            .update(record.id, |movement| {
                MovementStateMachine::new(movement)
                    .transition(MovementEvent::fail_with_error(reason.clone()))
                    .map(|_| ())
            })
            .await;
        // A concurrent abort may have settled the record first
        if let Err(mark_error) = marked {
            if !mark_error.is_client_visible() {
                return Err(mark_error);
            }
            warn!(
                movement_id = %record.id,
                error = %mark_error,
                "Could not mark movement failed after pipeline start error"
            );
        }
        log_movement_operation(
            "start",
            Some(&record.id),
            Some(&tenant_name),
            "error",
            Some(&reason),
        );
        return Err(BalancerError::PipelineFailure {
            movement_id: record.id,
            reason,
        });
    }

    Ok(MoveTenantsToClusterReply {
        movement_id: record.id,
    })
}

async fn get_movement_status(
    context: &BalancerContext,
    request: GetMovementStatusRequest,
) -> BalancerResult<GetMovementStatusReply> {
    let record = context
        .registry
        .get_by_tenant(&request.tenant_name)
        .await?
        .ok_or_else(|| {
            BalancerError::not_found(format!("no movement for tenant {}", request.tenant_name))
        })?;

    let telemetry = match context.data_mover.telemetry(record.id).await {
        Ok(telemetry) => telemetry,
        Err(error) => {
            warn!(
                movement_id = %record.id,
                error = %error,
                "Pipeline telemetry unavailable, reporting without lag"
            );
            None
        }
    };

    Ok(GetMovementStatusReply {
        movement_status: StatusReporter::compute_status(&record, telemetry.as_ref()),
    })
}

async fn get_active_movements(context: &BalancerContext) -> BalancerResult<GetActiveMovementsReply> {
    let active_movements = context
        .registry
        .list()
        .await?
        .iter()
        .map(|record| record.info())
        .collect();
    Ok(GetActiveMovementsReply { active_movements })
}

async fn abort_movement(
    context: &BalancerContext,
    request: AbortMovementRequest,
) -> BalancerResult<AbortMovementReply> {
    let tenant_name = request.tenant_name;
    // The tenant index always points at the latest movement, which is the
    // active one when there is one
    let record = context
        .registry
        .get_by_tenant(&tenant_name)
        .await?
        .ok_or_else(|| BalancerError::not_found(format!("no movement for tenant {tenant_name}")))?;

    let requested = context
        .registry
        .update(record.id, |movement| {
            MovementStateMachine::new(movement)
                .transition(MovementEvent::RequestAbort)
                .map(|_| ())
        })
        .await?;

    if let Some(abort_state) = requested.abort_state.filter(AbortState::is_resolved) {
        debug!(movement_id = %requested.id, abort_state = %abort_state, "Abort already resolved");
        return Ok(AbortMovementReply {
            abort_result: abort_state,
        });
    }

    if abort_outcome_for(&requested) == AbortState::RolledBack {
        if let Err(error) = context.data_mover.abort_movement(requested.id).await {
            log_movement_operation(
                "abort",
                Some(&requested.id),
                Some(&tenant_name),
                "unknown",
                Some(&error.to_string()),
            );
            return Ok(AbortMovementReply {
                abort_result: AbortState::Unknown,
            });
        }
    }

    let resolved = context
        .registry
        .update(requested.id, |movement| {
            let mut state_machine = MovementStateMachine::new(movement);
            let outcome = state_machine.abort_outcome();
            state_machine
                .transition(MovementEvent::ResolveAbort(outcome))
                .map(|_| ())
        })
        .await?;

    let abort_result = resolved.abort_state.unwrap_or(AbortState::Unknown);
    log_movement_operation(
        "abort",
        Some(&resolved.id),
        Some(&tenant_name),
        &abort_result.to_string(),
        None,
    );
    Ok(AbortMovementReply { abort_result })
}

/// Apply one pipeline progress report to its movement record
pub(crate) async fn apply_pipeline_event(
    context: Arc<BalancerContext>,
    event: PipelineEvent,
) -> BalancerResult<()> {
    let movement_id = event.movement_id();
    let movement_event = event.to_movement_event();
    let event_type = movement_event.event_type();

    let result = context
        .registry
        .update(movement_id, |movement| {
            MovementStateMachine::new(movement)
                .transition(movement_event.clone())
                .map(|_| ())
        })
        .await;

    match result {
        Ok(record) => {
            context.metrics.record_pipeline_event(event_type);
            log_movement_operation(
                event_type,
                Some(&movement_id),
                Some(&record.tenant_name),
                &record.state.to_string(),
                record.error.as_deref(),
            );
            Ok(())
        }
        Err(error) if error.is_client_visible() => {
            warn!(
                movement_id = %movement_id,
                event_type = event_type,
                error = %error,
                "Dropping pipeline event that does not apply"
            );
            Ok(())
        }
        Err(error) => Err(error),
    }
}
