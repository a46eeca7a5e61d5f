//! PostgreSQL-backed key-value store.
//!
//! Keys and values live in a single `bytea` table. Each transaction runs at
//! SERIALIZABLE isolation, so PostgreSQL's own conflict detection provides the
//! optimistic semantics the registry expects.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use tracing::debug;

use super::{key_range_end, KeyValueStore, KvTransaction, StorageError, StorageResult, WriteBuffer};

const KV_TABLE_DDL: &str = "CREATE TABLE IF NOT EXISTS tenant_balancer_kv (
    key BYTEA PRIMARY KEY,
    value BYTEA NOT NULL
)";

const SELECT_KEY: &str = "SELECT value FROM tenant_balancer_kv WHERE key = $1";
const SELECT_RANGE: &str =
    "SELECT key, value FROM tenant_balancer_kv WHERE key >= $1 AND key < $2 ORDER BY key";
const SELECT_FROM: &str = "SELECT key, value FROM tenant_balancer_kv WHERE key >= $1 ORDER BY key";
const UPSERT_KEY: &str = "INSERT INTO tenant_balancer_kv (key, value) VALUES ($1, $2)
    ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value";
const DELETE_KEY: &str = "DELETE FROM tenant_balancer_kv WHERE key = $1";

#[derive(Debug, Clone)]
pub struct PgKeyValueStore {
    pool: PgPool,
}

impl PgKeyValueStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the backing table if it does not exist yet
    pub async fn ensure_schema(&self) -> StorageResult<()> {
        sqlx::query(KV_TABLE_DDL).execute(&self.pool).await?;
        debug!("Ensured tenant_balancer_kv table exists");
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for PgKeyValueStore {
    async fn begin(&self) -> StorageResult<Box<dyn KvTransaction>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgTransaction {
            tx: Some(tx),
            writes: WriteBuffer::default(),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

/// Dropping an uncommitted transaction rolls it back
struct PgTransaction {
    tx: Option<Transaction<'static, Postgres>>,
    writes: WriteBuffer,
}

impl PgTransaction {
    fn open(&mut self) -> StorageResult<&mut Transaction<'static, Postgres>> {
        self.tx.as_mut().ok_or(StorageError::TransactionClosed)
    }
}

#[async_trait]
impl KvTransaction for PgTransaction {
    async fn get(&mut self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        if let Some(buffered) = self.writes.lookup(key) {
            return Ok(buffered);
        }

        let tx = self.open()?;
        let row = sqlx::query(SELECT_KEY)
            .bind(key)
            .fetch_optional(&mut **tx)
            .await?;
        match row {
            Some(row) => Ok(Some(row.try_get::<Vec<u8>, _>("value")?)),
            None => Ok(None),
        }
    }

    async fn get_prefix(&mut self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let tx = self.open()?;
        let rows = match key_range_end(prefix) {
            Some(end) => {
                sqlx::query(SELECT_RANGE)
                    .bind(prefix)
                    .bind(end)
                    .fetch_all(&mut **tx)
                    .await?
            }
            None => {
                sqlx::query(SELECT_FROM)
                    .bind(prefix)
                    .fetch_all(&mut **tx)
                    .await?
            }
        };

        let committed = rows
            .iter()
            .map(|row| {
                Ok((
                    row.try_get::<Vec<u8>, _>("key")?,
                    row.try_get::<Vec<u8>, _>("value")?,
                ))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;
        Ok(self.writes.overlay_prefix(prefix, committed))
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        if self.tx.is_some() {
            self.writes.set(key, value);
        }
    }

    fn clear(&mut self, key: &[u8]) {
        if self.tx.is_some() {
            self.writes.clear(key);
        }
    }

    async fn commit(&mut self) -> StorageResult<()> {
        let mut tx = self.tx.take().ok_or(StorageError::TransactionClosed)?;
        for (key, value) in self.writes.take() {
            match value {
                Some(value) => {
                    sqlx::query(UPSERT_KEY)
                        .bind(key)
                        .bind(value)
                        .execute(&mut *tx)
                        .await?;
                }
                None => {
                    sqlx::query(DELETE_KEY).bind(key).execute(&mut *tx).await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }
}
