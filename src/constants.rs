//! # System Constants
//!
//! Key-space layout, schema identifiers and operational defaults that define
//! the boundaries of the tenant balancer.

/// Key-space prefix reserved for the movement registry
pub const DEFAULT_KEY_PREFIX: &[u8] = b"\xff/tenantBalancer/";

/// Registry subspaces, appended to the key prefix
pub mod subspaces {
    pub const MOVEMENT: &[u8] = b"movement/";
    pub const TENANT_INDEX: &[u8] = b"tenant/";
    pub const SEQUENCE: &[u8] = b"sequence";
}

/// Version tag written in front of every persisted movement record
pub const RECORD_SCHEMA_VERSION: u16 = 1;

/// Version tag carried by every wire envelope
pub const PROTOCOL_VERSION: u16 = 1;

/// Stable schema identifiers, one per message type
pub mod file_identifiers {
    pub const TENANT_MOVEMENT_INFO: u32 = 16_510_400;
    pub const TENANT_MOVEMENT_STATUS: u32 = 5_103_586;
    pub const GET_MOVEMENT_STATUS_REPLY: u32 = 4_693_499;
    pub const GET_MOVEMENT_STATUS_REQUEST: u32 = 11_494_877;
    pub const MOVE_TENANTS_TO_CLUSTER_REPLY: u32 = 3_708_530;
    pub const MOVE_TENANTS_TO_CLUSTER_REQUEST: u32 = 3_571_712;
    pub const GET_ACTIVE_MOVEMENTS_REPLY: u32 = 2_320_458;
    pub const GET_ACTIVE_MOVEMENTS_REQUEST: u32 = 11_980_148;
    pub const ABORT_MOVEMENT_REPLY: u32 = 14_761_140;
    pub const ABORT_MOVEMENT_REQUEST: u32 = 14_058_403;
    pub const HALT_TENANT_BALANCER_REQUEST: u32 = 15_769_279;
}

/// Operational defaults used when configuration omits a value
pub mod defaults {
    pub const COMMAND_BUFFER_SIZE: usize = 1024;
    pub const PIPELINE_EVENT_BUFFER_SIZE: usize = 1024;
    pub const HALT_DRAIN_TIMEOUT_MS: u64 = 30_000;
    pub const MAX_TRANSACTION_RETRIES: u32 = 10;
    pub const RETRY_BACKOFF_MS: u64 = 5;
    pub const MAX_RETRY_BACKOFF_MS: u64 = 1_000;
    pub const DATABASE_MAX_CONNECTIONS: u32 = 10;
    pub const LOG_LEVEL: &str = "info";
    pub const CONFIG_FILE: &str = "config/tenant-balancer.toml";
}

/// Environment variables consulted at startup
pub mod env {
    pub const CONFIG_FILE: &str = "TENANT_BALANCER_CONFIG";
    pub const CONFIG_PREFIX: &str = "TENANT_BALANCER";
    pub const CONFIG_SEPARATOR: &str = "__";
}

/// OpenTelemetry meter name for balancer instruments
pub const METER_NAME: &str = "tenant-balancer";
