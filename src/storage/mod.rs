//! # Transactional Key-Value Storage
//!
//! The registry persists movements through [`KeyValueStore`], a small
//! transactional seam over an ordered byte-keyed store. Two backends ship:
//!
//! - [`MemoryKeyValueStore`]: optimistic in-process store for tests and
//!   single-process deployments
//! - [`PgKeyValueStore`]: serializable PostgreSQL transactions over a `bytea`
//!   table
//!
//! Both detect conflicting concurrent commits and report them as
//! [`StorageError::Conflict`]; retrying is the caller's business.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::{StorageBackend, StorageConfig};

pub mod memory;
pub mod postgres;

pub use memory::MemoryKeyValueStore;
pub use postgres::PgKeyValueStore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Transaction conflicted with a concurrent commit")]
    Conflict,
    #[error("Transaction is no longer open")]
    TransactionClosed,
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_error) = &error {
            // serialization_failure, deadlock_detected
            if matches!(db_error.code().as_deref(), Some("40001") | Some("40P01")) {
                return StorageError::Conflict;
            }
        }
        StorageError::Backend(error.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Factory for transactions over an ordered byte-keyed store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn begin(&self) -> StorageResult<Box<dyn KvTransaction>>;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// One transaction. Writes are buffered and visible to later reads in the
/// same transaction; nothing reaches the store before [`commit`](Self::commit).
#[async_trait]
pub trait KvTransaction: Send {
    async fn get(&mut self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// All pairs whose key starts with `prefix`, in ascending key order
    async fn get_prefix(&mut self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>>;

    fn set(&mut self, key: &[u8], value: &[u8]);

    fn clear(&mut self, key: &[u8]);

    async fn commit(&mut self) -> StorageResult<()>;
}

/// Smallest key strictly greater than every key starting with `prefix`.
/// `None` when the prefix is all `0xff` bytes and the range is unbounded.
pub fn key_range_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// Buffered writes of an open transaction; `None` marks a cleared key
#[derive(Debug, Default)]
pub(crate) struct WriteBuffer {
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl WriteBuffer {
    pub(crate) fn set(&mut self, key: &[u8], value: &[u8]) {
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
    }

    pub(crate) fn clear(&mut self, key: &[u8]) {
        self.writes.insert(key.to_vec(), None);
    }

    /// Outer `None` means the key was not written in this transaction
    pub(crate) fn lookup(&self, key: &[u8]) -> Option<Option<Vec<u8>>> {
        self.writes.get(key).cloned()
    }

    /// Layer buffered writes under `prefix` over committed pairs
    pub(crate) fn overlay_prefix(
        &self,
        prefix: &[u8],
        committed: Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = committed.into_iter().collect();
        let buffered = self
            .writes
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix));
        for (key, value) in buffered {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        merged.into_iter().collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub(crate) fn take(&mut self) -> BTreeMap<Vec<u8>, Option<Vec<u8>>> {
        std::mem::take(&mut self.writes)
    }
}

/// Build the configured store backend
pub async fn build_store(config: &StorageConfig) -> StorageResult<Arc<dyn KeyValueStore>> {
    let store: Arc<dyn KeyValueStore> = match config.backend {
        StorageBackend::Memory => Arc::new(MemoryKeyValueStore::new()),
        StorageBackend::Postgres => {
            let database_url = config.database_url.as_deref().ok_or_else(|| {
                StorageError::Backend("postgres backend requires storage.database_url".to_string())
            })?;
            let store = PgKeyValueStore::connect(database_url, config.max_connections).await?;
            store.ensure_schema().await?;
            Arc::new(store)
        }
    };

    info!(backend = store.backend_name(), "🗄️ STORAGE: Key-value store ready");
    Ok(store)
}
