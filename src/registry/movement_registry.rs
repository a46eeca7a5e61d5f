//! # Movement Registry
//!
//! Durable map from movement id to [`MovementRecord`], plus a tenant index
//! pointing at each tenant's latest movement.
//!
//! ## Key Features
//!
//! - **Store-First**: no in-memory cache; every call reads through a fresh
//!   transaction, so restarts lose nothing
//! - **One Active Movement per Tenant**: `create` reads the tenant index and
//!   writes the new record in the same transaction
//! - **Local Conflict Retry**: optimistic commit conflicts are retried with
//!   exponential backoff before anything reaches the caller
//! - **Tombstones**: terminal records stay until explicitly removed

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::codec::{
    decode_movement_id, decode_record, decode_sequence, encode_movement_id, encode_record,
    encode_sequence, RegistryKeys,
};
use crate::config::RegistryConfig;
use crate::constants::defaults;
use crate::error::{BalancerError, BalancerResult};
use crate::models::{MovementId, MovementRecord};
use crate::state_machine::StateMachineResult;
use crate::storage::{KeyValueStore, KvTransaction, StorageError};

pub struct MovementRegistry {
    store: Arc<dyn KeyValueStore>,
    keys: RegistryKeys,
    max_retries: u32,
    retry_backoff: Duration,
}

impl std::fmt::Debug for MovementRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MovementRegistry")
            .field("backend", &self.store.backend_name())
            .field("keys", &self.keys)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff", &self.retry_backoff)
            .finish()
    }
}

impl MovementRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &RegistryConfig) -> Self {
        let keys = match &config.key_prefix {
            Some(prefix) => RegistryKeys::new(prefix.as_bytes()),
            None => RegistryKeys::default(),
        };
        Self {
            store,
            keys,
            max_retries: config.max_transaction_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    pub fn keys(&self) -> &RegistryKeys {
        &self.keys
    }

    /// Start tracking a new movement in INITIALIZING and return its id
    pub async fn create(
        &self,
        tenant_name: &str,
        destination_cluster: &str,
    ) -> BalancerResult<MovementId> {
        Ok(self
            .create_record(tenant_name, destination_cluster)
            .await?
            .id)
    }

    /// Like [`create`](Self::create), returning the full record that was written
    pub async fn create_record(
        &self,
        tenant_name: &str,
        destination_cluster: &str,
    ) -> BalancerResult<MovementRecord> {
        let mut attempt = 0;
        loop {
            match self.try_create(tenant_name, destination_cluster).await {
                Err(BalancerError::Storage(StorageError::Conflict)) => {
                    self.retry_after_conflict("create", &mut attempt).await?
                }
                result => return result,
            }
        }
    }

    pub async fn get(&self, id: MovementId) -> BalancerResult<MovementRecord> {
        let mut attempt = 0;
        loop {
            match self.try_get(id).await {
                Err(BalancerError::Storage(StorageError::Conflict)) => {
                    self.retry_after_conflict("get", &mut attempt).await?
                }
                result => return result,
            }
        }
    }

    /// Latest movement for the tenant, active or not
    pub async fn get_by_tenant(&self, tenant_name: &str) -> BalancerResult<Option<MovementRecord>> {
        let mut attempt = 0;
        loop {
            match self.try_get_by_tenant(tenant_name).await {
                Err(BalancerError::Storage(StorageError::Conflict)) => {
                    self.retry_after_conflict("get_by_tenant", &mut attempt)
                        .await?
                }
                result => return result,
            }
        }
    }

    pub async fn get_active_by_tenant(
        &self,
        tenant_name: &str,
    ) -> BalancerResult<Option<MovementRecord>> {
        Ok(self
            .get_by_tenant(tenant_name)
            .await?
            .filter(MovementRecord::is_active))
    }

    /// Active movements in creation order
    pub async fn list(&self) -> BalancerResult<Vec<MovementRecord>> {
        let mut records = self.list_all().await?;
        records.retain(MovementRecord::is_active);
        Ok(records)
    }

    /// Every stored movement, tombstones included, in creation order
    pub async fn list_all(&self) -> BalancerResult<Vec<MovementRecord>> {
        let mut attempt = 0;
        loop {
            match self.try_list_all().await {
                Err(BalancerError::Storage(StorageError::Conflict)) => {
                    self.retry_after_conflict("list", &mut attempt).await?
                }
                result => return result,
            }
        }
    }

    /// Read-modify-write of one record.
    ///
    /// The mutator runs state-machine transitions against a copy; it may run
    /// more than once when the commit has to be retried. Nothing is written
    /// when the mutator leaves the record unchanged.
    pub async fn update<F>(&self, id: MovementId, mut mutator: F) -> BalancerResult<MovementRecord>
    where
        F: FnMut(&mut MovementRecord) -> StateMachineResult<()> + Send,
    {
        let mut attempt = 0;
        loop {
            match self.try_update(id, &mut mutator).await {
                Err(BalancerError::Storage(StorageError::Conflict)) => {
                    self.retry_after_conflict("update", &mut attempt).await?
                }
                result => return result,
            }
        }
    }

    /// Delete a finished movement
    pub async fn remove(&self, id: MovementId) -> BalancerResult<()> {
        let mut attempt = 0;
        loop {
            match self.try_remove(id).await {
                Err(BalancerError::Storage(StorageError::Conflict)) => {
                    self.retry_after_conflict("remove", &mut attempt).await?
                }
                result => return result,
            }
        }
    }

    async fn try_create(
        &self,
        tenant_name: &str,
        destination_cluster: &str,
    ) -> BalancerResult<MovementRecord> {
        let mut tx = self.store.begin().await?;

        if let Some(existing) = self.read_tenant_movement(tx.as_mut(), tenant_name).await? {
            if existing.is_active() {
                return Err(BalancerError::AlreadyInProgress {
                    tenant_name: tenant_name.to_string(),
                    movement_id: existing.id,
                });
            }
        }

        let sequence_key = self.keys.sequence_key();
        let sequence = match tx.get(&sequence_key).await? {
            Some(bytes) => decode_sequence(&bytes)? + 1,
            None => 1,
        };

        let id = MovementId::generate();
        let record = MovementRecord::new(id, tenant_name, destination_cluster, sequence);
        tx.set(&self.keys.movement_key(&id), &encode_record(&record)?);
        tx.set(&self.keys.tenant_key(tenant_name), &encode_movement_id(&id));
        tx.set(&sequence_key, &encode_sequence(sequence));
        tx.commit().await?;

        debug!(
            movement_id = %id,
            tenant_name = %tenant_name,
            destination_cluster = %destination_cluster,
            sequence = sequence,
            "Created movement record"
        );
        Ok(record)
    }

    async fn try_get(&self, id: MovementId) -> BalancerResult<MovementRecord> {
        let mut tx = self.store.begin().await?;
        self.read_movement(tx.as_mut(), id)
            .await?
            .ok_or_else(|| BalancerError::not_found(format!("movement {id}")))
    }

    async fn try_get_by_tenant(&self, tenant_name: &str) -> BalancerResult<Option<MovementRecord>> {
        let mut tx = self.store.begin().await?;
        self.read_tenant_movement(tx.as_mut(), tenant_name).await
    }

    async fn try_list_all(&self) -> BalancerResult<Vec<MovementRecord>> {
        let mut tx = self.store.begin().await?;
        let pairs = tx.get_prefix(&self.keys.movement_prefix()).await?;
        let mut records = pairs
            .iter()
            .map(|(_, value)| decode_record(value))
            .collect::<BalancerResult<Vec<_>>>()?;
        records.sort_by_key(|record| record.sequence);
        Ok(records)
    }

    async fn try_update<F>(&self, id: MovementId, mutator: &mut F) -> BalancerResult<MovementRecord>
    where
        F: FnMut(&mut MovementRecord) -> StateMachineResult<()> + Send,
    {
        let mut tx = self.store.begin().await?;
        let current = self
            .read_movement(tx.as_mut(), id)
            .await?
            .ok_or_else(|| BalancerError::not_found(format!("movement {id}")))?;

        let mut updated = current.clone();
        mutator(&mut updated)?;

        if updated.identity() != current.identity() {
            return Err(BalancerError::internal(format!(
                "update of movement {id} attempted to change immutable fields"
            )));
        }
        if updated == current {
            return Ok(current);
        }

        updated.updated_at = Utc::now();
        tx.set(&self.keys.movement_key(&id), &encode_record(&updated)?);
        tx.commit().await?;
        Ok(updated)
    }

    async fn try_remove(&self, id: MovementId) -> BalancerResult<()> {
        let mut tx = self.store.begin().await?;
        let record = self
            .read_movement(tx.as_mut(), id)
            .await?
            .ok_or_else(|| BalancerError::not_found(format!("movement {id}")))?;
        if record.is_active() {
            return Err(BalancerError::conflict(format!(
                "movement {id} is still {} and cannot be removed",
                record.state
            )));
        }

        tx.clear(&self.keys.movement_key(&id));
        let tenant_key = self.keys.tenant_key(&record.tenant_name);
        if let Some(indexed) = tx.get(&tenant_key).await? {
            if decode_movement_id(&indexed)? == id {
                tx.clear(&tenant_key);
            }
        }
        tx.commit().await?;

        debug!(movement_id = %id, tenant_name = %record.tenant_name, "Removed movement record");
        Ok(())
    }

    async fn read_movement(
        &self,
        tx: &mut dyn KvTransaction,
        id: MovementId,
    ) -> BalancerResult<Option<MovementRecord>> {
        tx.get(&self.keys.movement_key(&id))
            .await?
            .map(|bytes| decode_record(&bytes))
            .transpose()
    }

    async fn read_tenant_movement(
        &self,
        tx: &mut dyn KvTransaction,
        tenant_name: &str,
    ) -> BalancerResult<Option<MovementRecord>> {
        let Some(indexed) = tx.get(&self.keys.tenant_key(tenant_name)).await? else {
            return Ok(None);
        };
        let id = decode_movement_id(&indexed)?;
        let record = self.read_movement(tx, id).await?;
        if record.is_none() {
            warn!(
                tenant_name = %tenant_name,
                movement_id = %id,
                "Tenant index points at a missing movement record"
            );
        }
        Ok(record)
    }

    async fn retry_after_conflict(
        &self,
        operation: &'static str,
        attempt: &mut u32,
    ) -> BalancerResult<()> {
        if *attempt >= self.max_retries {
            warn!(
                operation = operation,
                retries = self.max_retries,
                "Registry transaction retries exhausted"
            );
            return Err(BalancerError::conflict(format!(
                "registry {operation} kept conflicting after {} retries",
                self.max_retries
            )));
        }

        *attempt += 1;
        let exponent = (*attempt - 1).min(16);
        let backoff = self
            .retry_backoff
            .saturating_mul(1u32 << exponent)
            .min(Duration::from_millis(defaults::MAX_RETRY_BACKOFF_MS));
        debug!(
            operation = operation,
            attempt = *attempt,
            backoff_ms = backoff.as_millis() as u64,
            "Registry transaction conflicted, retrying"
        );
        tokio::time::sleep(backoff).await;
        Ok(())
    }
}
