//! # Registry Encoding
//!
//! Byte layout of everything the registry persists. Integers are written
//! big-endian so keys sort the way their numeric values do, and nothing here
//! depends on in-memory struct layout.
//!
//! ```text
//! <prefix>movement/<16-byte id>   -> <u16 schema version><json record>
//! <prefix>tenant/<tenant name>    -> <16-byte id>
//! <prefix>sequence                -> <u64 last allocated sequence>
//! ```

use crate::constants::{subspaces, DEFAULT_KEY_PREFIX, RECORD_SCHEMA_VERSION};
use crate::error::{BalancerError, BalancerResult};
use crate::models::{MovementId, MovementRecord};

pub const MOVEMENT_ID_LEN: usize = 16;
const SCHEMA_VERSION_LEN: usize = 2;

/// Fixed-width key encoding: `first` then `second`, both big-endian
pub fn encode_movement_id(id: &MovementId) -> [u8; MOVEMENT_ID_LEN] {
    let mut bytes = [0u8; MOVEMENT_ID_LEN];
    bytes[..8].copy_from_slice(&id.first().to_be_bytes());
    bytes[8..].copy_from_slice(&id.second().to_be_bytes());
    bytes
}

pub fn decode_movement_id(bytes: &[u8]) -> BalancerResult<MovementId> {
    if bytes.len() != MOVEMENT_ID_LEN {
        return Err(BalancerError::Serialization(format!(
            "movement id must be {MOVEMENT_ID_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    let mut first = [0u8; 8];
    let mut second = [0u8; 8];
    first.copy_from_slice(&bytes[..8]);
    second.copy_from_slice(&bytes[8..]);
    Ok(MovementId::new(
        u64::from_be_bytes(first),
        u64::from_be_bytes(second),
    ))
}

/// Schema version followed by the JSON record
pub fn encode_record(record: &MovementRecord) -> BalancerResult<Vec<u8>> {
    let body = serde_json::to_vec(record)?;
    let mut bytes = Vec::with_capacity(SCHEMA_VERSION_LEN + body.len());
    bytes.extend_from_slice(&RECORD_SCHEMA_VERSION.to_be_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

pub fn decode_record(bytes: &[u8]) -> BalancerResult<MovementRecord> {
    if bytes.len() < SCHEMA_VERSION_LEN {
        return Err(BalancerError::Serialization(
            "movement record is missing its schema version".to_string(),
        ));
    }
    let (version, body) = bytes.split_at(SCHEMA_VERSION_LEN);
    let version = u16::from_be_bytes([version[0], version[1]]);
    if version == 0 || version > RECORD_SCHEMA_VERSION {
        return Err(BalancerError::Serialization(format!(
            "unsupported movement record schema version {version} (supported up to {RECORD_SCHEMA_VERSION})"
        )));
    }
    Ok(serde_json::from_slice(body)?)
}

pub fn encode_sequence(sequence: u64) -> [u8; 8] {
    sequence.to_be_bytes()
}

pub fn decode_sequence(bytes: &[u8]) -> BalancerResult<u64> {
    let bytes: [u8; 8] = bytes.try_into().map_err(|_| {
        BalancerError::Serialization(format!("sequence must be 8 bytes, got {}", bytes.len()))
    })?;
    Ok(u64::from_be_bytes(bytes))
}

/// Key builder for one registry namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryKeys {
    prefix: Vec<u8>,
}

impl Default for RegistryKeys {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

impl RegistryKeys {
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    fn subspace(&self, subspace: &[u8], suffix: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.prefix.len() + subspace.len() + suffix.len());
        key.extend_from_slice(&self.prefix);
        key.extend_from_slice(subspace);
        key.extend_from_slice(suffix);
        key
    }

    pub fn movement_key(&self, id: &MovementId) -> Vec<u8> {
        self.subspace(subspaces::MOVEMENT, &encode_movement_id(id))
    }

    /// Range prefix covering every movement record
    pub fn movement_prefix(&self) -> Vec<u8> {
        self.subspace(subspaces::MOVEMENT, &[])
    }

    pub fn tenant_key(&self, tenant_name: &str) -> Vec<u8> {
        self.subspace(subspaces::TENANT_INDEX, tenant_name.as_bytes())
    }

    pub fn sequence_key(&self) -> Vec<u8> {
        self.subspace(subspaces::SEQUENCE, &[])
    }
}
