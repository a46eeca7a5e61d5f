//! # Models
//!
//! Movement identity, the durable movement record, and the transient status
//! view built from it.

pub mod movement;
pub mod status;

pub use movement::{MovementId, MovementRecord, MovementTransition, TenantMovementInfo};
pub use status::{PipelineTelemetry, TenantMovementStatus};
