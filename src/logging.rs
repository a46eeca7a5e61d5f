//! # Structured Logging Module
//!
//! Environment-aware structured logging for the balancer's request loop and
//! movement lifecycle. Output is human-readable by default and JSON when
//! `telemetry.json_logs` is set.

use chrono::Utc;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::TelemetryConfig;
use crate::models::MovementId;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process. `RUST_LOG` wins over the
/// configured level.
pub fn init_structured_logging(config: &TelemetryConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

        let result = if config.json_logs {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_level(true)
                        .with_filter(filter),
                )
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_level(true)
                        .with_ansi(true)
                        .with_filter(filter),
                )
                .try_init()
        };

        // Use try_init to avoid panic if global subscriber already set
        if result.is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            json = config.json_logs,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("TENANT_BALANCER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Log structured data for movement operations
pub fn log_movement_operation(
    operation: &str,
    movement_id: Option<&MovementId>,
    tenant_name: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    let movement_id = movement_id.map(ToString::to_string);
    tracing::info!(
        operation = %operation,
        movement_id = movement_id.as_deref(),
        tenant_name = tenant_name,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🚚 MOVEMENT_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
