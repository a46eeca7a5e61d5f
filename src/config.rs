//! # Tenant Balancer Configuration
//!
//! Layered configuration built with the `config` crate:
//!
//! 1. Built-in defaults (every section is `#[serde(default)]`)
//! 2. Optional TOML file, `TENANT_BALANCER_CONFIG` or `config/tenant-balancer.toml`
//! 3. Environment overrides, e.g. `TENANT_BALANCER__SERVICE__LOCAL_CLUSTER_NAME`
//!
//! ```rust,no_run
//! use tenant_balancer::config::BalancerConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BalancerConfig::load()?;
//! println!("serving {} known clusters", config.service.known_clusters.len());
//! # Ok(())
//! # }
//! ```

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::constants::{defaults, env};
use crate::error::{BalancerError, BalancerResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    pub service: ServiceConfig,
    pub registry: RegistryConfig,
    pub storage: StorageConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Identity of this balancer instance; random when not configured
    pub balancer_id: Option<Uuid>,
    /// Cluster this balancer runs on; never a valid destination
    pub local_cluster_name: String,
    /// Clusters tenants may be moved to
    pub known_clusters: Vec<String>,
    pub command_buffer_size: usize,
    pub pipeline_event_buffer_size: usize,
    pub halt_drain_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            balancer_id: None,
            local_cluster_name: "local".to_string(),
            known_clusters: Vec::new(),
            command_buffer_size: defaults::COMMAND_BUFFER_SIZE,
            pipeline_event_buffer_size: defaults::PIPELINE_EVENT_BUFFER_SIZE,
            halt_drain_timeout_ms: defaults::HALT_DRAIN_TIMEOUT_MS,
        }
    }
}

impl ServiceConfig {
    pub fn halt_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.halt_drain_timeout_ms)
    }

    pub fn is_known_cluster(&self, cluster: &str) -> bool {
        self.known_clusters.iter().any(|known| known == cluster)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub max_transaction_retries: u32,
    pub retry_backoff_ms: u64,
    /// Overrides the default `\xff/tenantBalancer/` key prefix
    pub key_prefix: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_transaction_retries: defaults::MAX_TRANSACTION_RETRIES,
            retry_backoff_ms: defaults::RETRY_BACKOFF_MS,
            key_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            database_url: None,
            max_connections: defaults::DATABASE_MAX_CONNECTIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: defaults::LOG_LEVEL.to_string(),
            json_logs: false,
        }
    }
}

impl BalancerConfig {
    /// Load from the configured file path and the process environment
    pub fn load() -> BalancerResult<Self> {
        let path = std::env::var(env::CONFIG_FILE)
            .unwrap_or_else(|_| defaults::CONFIG_FILE.to_string());
        Self::load_from(Path::new(&path), None)
    }

    /// Load from `path` (skipped when missing). `env_overrides` replaces the
    /// process environment as the override source when given.
    pub fn load_from(
        path: &Path,
        env_overrides: Option<config::Map<String, String>>,
    ) -> BalancerResult<Self> {
        let mut builder = Config::builder();
        if path.exists() {
            builder = builder.add_source(File::from(path));
        }

        let environment = Environment::with_prefix(env::CONFIG_PREFIX)
            .prefix_separator(env::CONFIG_SEPARATOR)
            .separator(env::CONFIG_SEPARATOR)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("service.known_clusters")
            .source(env_overrides);
        builder = builder.add_source(environment);

        let config: BalancerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BalancerResult<()> {
        if self.service.local_cluster_name.trim().is_empty() {
            return Err(BalancerError::Configuration(
                "service.local_cluster_name must not be empty".to_string(),
            ));
        }
        if self.service.command_buffer_size == 0 {
            return Err(BalancerError::Configuration(
                "service.command_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.service.pipeline_event_buffer_size == 0 {
            return Err(BalancerError::Configuration(
                "service.pipeline_event_buffer_size must be greater than zero".to_string(),
            ));
        }
        if matches!(&self.registry.key_prefix, Some(prefix) if prefix.is_empty()) {
            return Err(BalancerError::Configuration(
                "registry.key_prefix must not be empty when set".to_string(),
            ));
        }
        if self.storage.backend == StorageBackend::Postgres && self.storage.database_url.is_none()
        {
            return Err(BalancerError::Configuration(
                "storage.database_url is required for the postgres backend".to_string(),
            ));
        }
        Ok(())
    }
}
