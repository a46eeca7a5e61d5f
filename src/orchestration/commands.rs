//! Commands accepted by the request dispatcher.

use tokio::sync::oneshot;

use crate::error::{BalancerError, BalancerResult};
use crate::metrics::RequestKind;
use crate::protocol::{
    AbortMovementReply, AbortMovementRequest, GetActiveMovementsReply, GetActiveMovementsRequest,
    GetMovementStatusReply, GetMovementStatusRequest, HaltTenantBalancerRequest,
    MoveTenantsToClusterReply, MoveTenantsToClusterRequest,
};

/// Type alias for command response channels
pub type CommandResponder<T> = oneshot::Sender<BalancerResult<T>>;

/// Everything a client can ask of the balancer
#[derive(Debug)]
pub enum BalancerCommand {
    /// Stop accepting requests; acknowledged before the service winds down
    Halt {
        request: HaltTenantBalancerRequest,
        resp: CommandResponder<()>,
    },
    /// Work handled by a per-request task
    Movement(MovementCommand),
}

#[derive(Debug)]
pub enum MovementCommand {
    GetMovementStatus {
        request: GetMovementStatusRequest,
        resp: CommandResponder<GetMovementStatusReply>,
    },
    GetActiveMovements {
        request: GetActiveMovementsRequest,
        resp: CommandResponder<GetActiveMovementsReply>,
    },
    MoveTenantsToCluster {
        request: MoveTenantsToClusterRequest,
        resp: CommandResponder<MoveTenantsToClusterReply>,
    },
    AbortMovement {
        request: AbortMovementRequest,
        resp: CommandResponder<AbortMovementReply>,
    },
}

impl MovementCommand {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::GetMovementStatus { .. } => RequestKind::GetMovementStatus,
            Self::GetActiveMovements { .. } => RequestKind::GetActiveMovements,
            Self::MoveTenantsToCluster { .. } => RequestKind::MoveTenantsToCluster,
            Self::AbortMovement { .. } => RequestKind::AbortMovement,
        }
    }
}

impl BalancerCommand {
    /// Answer the command with `error` without doing any work
    pub fn reject(self, error: BalancerError) {
        // The caller may already be gone; nothing to do then
        let _ = match self {
            Self::Halt { resp, .. } => resp.send(Err(error)).is_ok(),
            Self::Movement(MovementCommand::GetMovementStatus { resp, .. }) => {
                resp.send(Err(error)).is_ok()
            }
            Self::Movement(MovementCommand::GetActiveMovements { resp, .. }) => {
                resp.send(Err(error)).is_ok()
            }
            Self::Movement(MovementCommand::MoveTenantsToCluster { resp, .. }) => {
                resp.send(Err(error)).is_ok()
            }
            Self::Movement(MovementCommand::AbortMovement { resp, .. }) => {
                resp.send(Err(error)).is_ok()
            }
        };
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Halt { .. } => "halt",
            Self::Movement(command) => command.kind().as_str(),
        }
    }
}
