//! # Orchestration
//!
//! The balancer's request-serving core.
//!
//! ## Core Components
//!
//! - **RequestDispatcher**: single control loop that accepts requests, pipeline
//!   progress and failure-wait registrations, and spawns one task per request
//! - **BalancerHandle**: typed client API over the command channel
//! - **Handlers**: per-request logic driving the registry and the pipeline
//!
//! Durable state lives only in the [`crate::registry`]; the dispatcher itself
//! can be restarted at any point and resumes from what the registry holds.

pub mod commands;
pub mod dispatcher;
pub mod handle;
pub(crate) mod handlers;

pub use commands::{BalancerCommand, CommandResponder, MovementCommand};
pub use dispatcher::{RequestDispatcher, ServiceExit};
pub use handle::BalancerHandle;
