//! # Movement Registry
//!
//! Durable storage of tenant movements on top of the transactional key-value
//! store.
//!
//! ## Architecture
//!
//! ```text
//! Registry
//! ├── codec              (key layout, id and record encoding)
//! └── MovementRegistry   (create / get / list / update / remove)
//! ```
//!
//! ```rust
//! use std::sync::Arc;
//! use tenant_balancer::config::RegistryConfig;
//! use tenant_balancer::registry::MovementRegistry;
//! use tenant_balancer::storage::MemoryKeyValueStore;
//!
//! # tokio_test::block_on(async {
//! let registry = MovementRegistry::new(
//!     Arc::new(MemoryKeyValueStore::new()),
//!     &RegistryConfig::default(),
//! );
//! let id = registry.create("tenantA", "clusterB").await.unwrap();
//! assert_eq!(registry.get(id).await.unwrap().tenant_name, "tenantA");
//! # });
//! ```

pub mod codec;
pub mod movement_registry;

pub use codec::RegistryKeys;
pub use movement_registry::MovementRegistry;
