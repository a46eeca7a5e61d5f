//! # Wire Protocol
//!
//! Request and reply messages exchanged with balancer clients. Every message
//! type carries a stable numeric schema identifier so peers can reject a
//! payload meant for a different message.
//!
//! ```text
//! envelope = <u32 schema id><u16 protocol version><json payload>
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{file_identifiers, PROTOCOL_VERSION};
use crate::error::{BalancerError, BalancerResult};
use crate::models::{MovementId, TenantMovementInfo, TenantMovementStatus};
use crate::state_machine::AbortState;

const ENVELOPE_HEADER_LEN: usize = 6;

/// A message with a stable schema identifier
pub trait WireMessage: Serialize + DeserializeOwned {
    const FILE_IDENTIFIER: u32;
}

impl WireMessage for TenantMovementInfo {
    const FILE_IDENTIFIER: u32 = file_identifiers::TENANT_MOVEMENT_INFO;
}

impl WireMessage for TenantMovementStatus {
    const FILE_IDENTIFIER: u32 = file_identifiers::TENANT_MOVEMENT_STATUS;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaltTenantBalancerRequest {
    pub requester_id: Uuid,
}

impl WireMessage for HaltTenantBalancerRequest {
    const FILE_IDENTIFIER: u32 = file_identifiers::HALT_TENANT_BALANCER_REQUEST;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetMovementStatusRequest {
    pub tenant_name: String,
}

impl WireMessage for GetMovementStatusRequest {
    const FILE_IDENTIFIER: u32 = file_identifiers::GET_MOVEMENT_STATUS_REQUEST;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetMovementStatusReply {
    pub movement_status: TenantMovementStatus,
}

impl WireMessage for GetMovementStatusReply {
    const FILE_IDENTIFIER: u32 = file_identifiers::GET_MOVEMENT_STATUS_REPLY;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveTenantsToClusterRequest {
    pub tenant_name: String,
    pub destination_cluster: String,
}

impl WireMessage for MoveTenantsToClusterRequest {
    const FILE_IDENTIFIER: u32 = file_identifiers::MOVE_TENANTS_TO_CLUSTER_REQUEST;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveTenantsToClusterReply {
    pub movement_id: MovementId,
}

impl WireMessage for MoveTenantsToClusterReply {
    const FILE_IDENTIFIER: u32 = file_identifiers::MOVE_TENANTS_TO_CLUSTER_REPLY;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetActiveMovementsRequest {}

impl WireMessage for GetActiveMovementsRequest {
    const FILE_IDENTIFIER: u32 = file_identifiers::GET_ACTIVE_MOVEMENTS_REQUEST;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetActiveMovementsReply {
    pub active_movements: Vec<TenantMovementInfo>,
}

impl WireMessage for GetActiveMovementsReply {
    const FILE_IDENTIFIER: u32 = file_identifiers::GET_ACTIVE_MOVEMENTS_REPLY;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortMovementRequest {
    pub tenant_name: String,
}

impl WireMessage for AbortMovementRequest {
    const FILE_IDENTIFIER: u32 = file_identifiers::ABORT_MOVEMENT_REQUEST;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortMovementReply {
    pub abort_result: AbortState,
}

impl WireMessage for AbortMovementReply {
    const FILE_IDENTIFIER: u32 = file_identifiers::ABORT_MOVEMENT_REPLY;
}

pub fn encode_message<M: WireMessage>(message: &M) -> BalancerResult<Vec<u8>> {
    let payload = serde_json::to_vec(message)?;
    let mut bytes = Vec::with_capacity(ENVELOPE_HEADER_LEN + payload.len());
    bytes.extend_from_slice(&M::FILE_IDENTIFIER.to_be_bytes());
    bytes.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

pub fn decode_message<M: WireMessage>(bytes: &[u8]) -> BalancerResult<M> {
    if bytes.len() < ENVELOPE_HEADER_LEN {
        return Err(BalancerError::Serialization(format!(
            "envelope of {} bytes is shorter than its header",
            bytes.len()
        )));
    }

    let file_identifier = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if file_identifier != M::FILE_IDENTIFIER {
        return Err(BalancerError::Serialization(format!(
            "expected message {} but envelope carries {file_identifier}",
            M::FILE_IDENTIFIER
        )));
    }

    let version = u16::from_be_bytes([bytes[4], bytes[5]]);
    if version > PROTOCOL_VERSION {
        return Err(BalancerError::Serialization(format!(
            "protocol version {version} is newer than supported {PROTOCOL_VERSION}"
        )));
    }

    Ok(serde_json::from_slice(&bytes[ENVELOPE_HEADER_LEN..])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_header_layout() {
        let request = AbortMovementRequest {
            tenant_name: "tenantA".to_string(),
        };
        let bytes = encode_message(&request).unwrap();
        assert_eq!(&bytes[..4], &14_058_403u32.to_be_bytes());
        assert_eq!(&bytes[4..6], &PROTOCOL_VERSION.to_be_bytes());

        let decoded: AbortMovementRequest = decode_message(&bytes).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_schema_id_mismatch_is_rejected() {
        let bytes = encode_message(&GetMovementStatusRequest {
            tenant_name: "tenantA".to_string(),
        })
        .unwrap();
        let result: BalancerResult<AbortMovementRequest> = decode_message(&bytes);
        assert!(matches!(result, Err(BalancerError::Serialization(_))));
    }

    #[test]
    fn test_newer_protocol_version_is_rejected() {
        let mut bytes = encode_message(&HaltTenantBalancerRequest {
            requester_id: Uuid::new_v4(),
        })
        .unwrap();
        bytes[4..6].copy_from_slice(&(PROTOCOL_VERSION + 1).to_be_bytes());
        let result: BalancerResult<HaltTenantBalancerRequest> = decode_message(&bytes);
        assert!(result.is_err());
    }

    #[test]
    fn test_truncated_envelope_is_rejected() {
        let result: BalancerResult<GetActiveMovementsRequest> = decode_message(&[0, 1, 2]);
        assert!(result.is_err());
    }

    #[test]
    fn test_abort_reply_carries_state() {
        let reply = AbortMovementReply {
            abort_result: AbortState::RolledBack,
        };
        let decoded: AbortMovementReply =
            decode_message(&encode_message(&reply).unwrap()).unwrap();
        assert_eq!(decoded.abort_result, AbortState::RolledBack);
    }
}
