//! Client-side handle to a running balancer.

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::commands::{BalancerCommand, CommandResponder, MovementCommand};
use crate::error::{BalancerError, BalancerResult};
use crate::models::{MovementId, TenantMovementInfo, TenantMovementStatus};
use crate::protocol::{
    AbortMovementRequest, GetActiveMovementsRequest, GetMovementStatusRequest,
    HaltTenantBalancerRequest, MoveTenantsToClusterRequest,
};
use crate::state_machine::AbortState;

/// Cheap to clone; every clone talks to the same dispatcher
#[derive(Debug, Clone)]
pub struct BalancerHandle {
    command_sender: mpsc::Sender<BalancerCommand>,
    wait_failure_sender: mpsc::Sender<oneshot::Sender<()>>,
}

impl BalancerHandle {
    pub(crate) fn new(
        command_sender: mpsc::Sender<BalancerCommand>,
        wait_failure_sender: mpsc::Sender<oneshot::Sender<()>>,
    ) -> Self {
        Self {
            command_sender,
            wait_failure_sender,
        }
    }

    /// Start moving `tenant_name` to `destination_cluster`
    pub async fn move_tenant_to_cluster(
        &self,
        tenant_name: impl Into<String>,
        destination_cluster: impl Into<String>,
    ) -> BalancerResult<MovementId> {
        let request = MoveTenantsToClusterRequest {
            tenant_name: tenant_name.into(),
            destination_cluster: destination_cluster.into(),
        };
        let reply = self
            .call(|resp| {
                BalancerCommand::Movement(MovementCommand::MoveTenantsToCluster { request, resp })
            })
            .await?;
        Ok(reply.movement_id)
    }

    pub async fn get_movement_status(
        &self,
        tenant_name: impl Into<String>,
    ) -> BalancerResult<TenantMovementStatus> {
        let request = GetMovementStatusRequest {
            tenant_name: tenant_name.into(),
        };
        let reply = self
            .call(|resp| {
                BalancerCommand::Movement(MovementCommand::GetMovementStatus { request, resp })
            })
            .await?;
        Ok(reply.movement_status)
    }

    pub async fn get_active_movements(&self) -> BalancerResult<Vec<TenantMovementInfo>> {
        let request = GetActiveMovementsRequest::default();
        let reply = self
            .call(|resp| {
                BalancerCommand::Movement(MovementCommand::GetActiveMovements { request, resp })
            })
            .await?;
        Ok(reply.active_movements)
    }

    /// Abort the tenant's movement. `Unknown` means the abort is recorded but
    /// its outcome could not be settled yet; retrying is safe.
    pub async fn abort_movement(&self, tenant_name: impl Into<String>) -> BalancerResult<AbortState> {
        let request = AbortMovementRequest {
            tenant_name: tenant_name.into(),
        };
        let reply = self
            .call(|resp| BalancerCommand::Movement(MovementCommand::AbortMovement { request, resp }))
            .await?;
        Ok(reply.abort_result)
    }

    /// Ask the balancer to stop. Returns once the halt is acknowledged.
    pub async fn halt(&self, requester_id: Uuid) -> BalancerResult<()> {
        let request = HaltTenantBalancerRequest { requester_id };
        self.call(|resp| BalancerCommand::Halt { request, resp }).await
    }

    /// Resolves when the balancer stops, for whatever reason
    pub async fn wait_failure(&self) {
        let (waiter, stopped) = oneshot::channel();
        if self.wait_failure_sender.send(waiter).await.is_err() {
            return;
        }
        // Never answered; the dispatcher drops it on exit
        let _ = stopped.await;
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(CommandResponder<T>) -> BalancerCommand,
    ) -> BalancerResult<T> {
        let (resp, reply) = oneshot::channel();
        self.command_sender
            .send(build(resp))
            .await
            .map_err(|_| BalancerError::ServiceUnavailable("balancer is not running".to_string()))?;
        reply.await.map_err(|_| {
            BalancerError::ServiceUnavailable("request dropped before a reply".to_string())
        })?
    }
}
