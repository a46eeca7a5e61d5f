#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tenant Balancer
//!
//! Control-plane service that orchestrates moving tenants between database
//! clusters.
//!
//! ## Overview
//!
//! A client asks the balancer to move a tenant to another cluster. The
//! balancer records a durable movement, hands the copy to the data-movement
//! pipeline, and tracks the movement through its lifecycle as the pipeline
//! reports progress. Clients can poll a movement's status, list active
//! movements, and abort a movement at any point before it is finalized.
//!
//! ## Architecture
//!
//! ```text
//! BalancerHandle ──→ RequestDispatcher ──→ per-request task ──→ MovementRegistry ──→ KeyValueStore
//!                          ↑                      │
//!               PipelineReporter            DataMover (pipeline)
//! ```
//!
//! ## Module Organization
//!
//! - [`orchestration`] - Request dispatcher, client handle and request handlers
//! - [`state_machine`] - Movement lifecycle and abort resolution
//! - [`registry`] - Durable, transactional movement records
//! - [`storage`] - Transactional key-value backends (memory, PostgreSQL)
//! - [`protocol`] - Request/reply messages and their versioned encoding
//! - [`services`] - Pipeline and failure-monitor seams, status computation
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tenant_balancer::config::BalancerConfig;
//! use tenant_balancer::orchestration::RequestDispatcher;
//! use tenant_balancer::services::{InMemoryDataMover, NeverFailMonitor};
//! use tenant_balancer::system_context::BalancerContext;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = BalancerConfig::default();
//! config.service.known_clusters = vec!["clusterB".to_string()];
//!
//! let context = BalancerContext::from_config(&config, Arc::new(InMemoryDataMover::new())).await?;
//! let (dispatcher, handle, _reporter) =
//!     RequestDispatcher::new(Arc::new(context), Arc::new(NeverFailMonitor));
//! tokio::spawn(dispatcher.run());
//!
//! let movement_id = handle.move_tenant_to_cluster("tenantA", "clusterB").await?;
//! println!("started movement {movement_id}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestration;
pub mod protocol;
pub mod registry;
pub mod services;
pub mod state_machine;
pub mod storage;
pub mod system_context;

pub use config::BalancerConfig;
pub use error::{BalancerError, BalancerResult};
pub use models::{
    MovementId, MovementRecord, PipelineTelemetry, TenantMovementInfo, TenantMovementStatus,
};
pub use orchestration::{BalancerHandle, RequestDispatcher, ServiceExit};
pub use registry::MovementRegistry;
pub use state_machine::{AbortState, MovementState};
pub use system_context::BalancerContext;
