//! Error types for the tenant balancer.
//!

use crate::models::MovementId;
use crate::state_machine::errors::StateMachineError;
use crate::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BalancerError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Tenant {tenant_name} already has movement {movement_id} in progress")]
    AlreadyInProgress {
        tenant_name: String,
        movement_id: MovementId,
    },
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Pipeline failure for movement {movement_id}: {reason}")]
    PipelineFailure {
        movement_id: MovementId,
        reason: String,
    },
    #[error("Internal fault: {0}")]
    InternalFault(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Service halted")]
    ServiceHalted,
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl BalancerError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict(reason.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::InternalFault(reason.into())
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput(reason.into())
    }

    /// Errors that belong to a single caller. Anything else is a fault of the
    /// service instance itself and ends the dispatcher loop.
    pub fn is_client_visible(&self) -> bool {
        !matches!(self, Self::InternalFault(_))
    }

    /// Stable label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyInProgress { .. } => "already_in_progress",
            Self::Conflict(_) => "conflict",
            Self::PipelineFailure { .. } => "pipeline_failure",
            Self::InternalFault(_) => "internal_fault",
            Self::InvalidInput(_) => "invalid_input",
            Self::Storage(_) => "storage",
            Self::Serialization(_) => "serialization",
            Self::Configuration(_) => "configuration",
            Self::ServiceHalted => "service_halted",
            Self::ServiceUnavailable(_) => "service_unavailable",
        }
    }
}

impl From<serde_json::Error> for BalancerError {
    fn from(error: serde_json::Error) -> Self {
        BalancerError::Serialization(format!("JSON serialization error: {error}"))
    }
}

impl From<config::ConfigError> for BalancerError {
    fn from(error: config::ConfigError) -> Self {
        BalancerError::Configuration(error.to_string())
    }
}

impl From<StateMachineError> for BalancerError {
    fn from(error: StateMachineError) -> Self {
        BalancerError::Conflict(error.to_string())
    }
}

pub type BalancerResult<T> = Result<T, BalancerError>;
