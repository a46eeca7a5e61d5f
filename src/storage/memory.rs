//! In-process optimistic key-value store.
//!
//! Every commit bumps a global version and stamps the keys it touched. A
//! transaction remembers the version it started at plus every key and prefix
//! it read; reading or committing over anything stamped later is a conflict.
//! Stamps no open transaction can conflict with are pruned as transactions
//! finish, so the bookkeeping stays proportional to recent writes.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::{KeyValueStore, KvTransaction, StorageError, StorageResult, WriteBuffer};

#[derive(Debug, Default)]
struct MemoryState {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Version of the last commit that wrote or cleared each key
    modified_at: BTreeMap<Vec<u8>, u64>,
    /// Read versions of open transactions, with their counts
    open_reads: BTreeMap<u64, usize>,
    version: u64,
}

impl MemoryState {
    fn register(&mut self) -> u64 {
        *self.open_reads.entry(self.version).or_default() += 1;
        self.version
    }

    /// Forget a finished transaction and drop stamps nobody can conflict with
    fn release(&mut self, read_version: u64) {
        if let Some(count) = self.open_reads.get_mut(&read_version) {
            *count -= 1;
            if *count == 0 {
                self.open_reads.remove(&read_version);
            }
        }
        let oldest = self
            .open_reads
            .keys()
            .next()
            .copied()
            .unwrap_or(self.version);
        self.modified_at.retain(|_, modified| *modified > oldest);
    }

    fn modified_since(&self, key: &[u8], version: u64) -> bool {
        self.modified_at
            .get(key)
            .is_some_and(|modified| *modified > version)
    }

    fn prefix_modified_since(&self, prefix: &[u8], version: u64) -> bool {
        self.modified_at
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .any(|(_, modified)| *modified > version)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.state.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Version of the last successful commit
    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    /// Keys still carrying a modification stamp
    pub fn stamped_key_count(&self) -> usize {
        self.state.lock().modified_at.len()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn begin(&self) -> StorageResult<Box<dyn KvTransaction>> {
        let read_version = self.state.lock().register();
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            read_version,
            read_keys: BTreeSet::new(),
            read_prefixes: Vec::new(),
            writes: WriteBuffer::default(),
            open: true,
        }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryTransaction {
    state: Arc<Mutex<MemoryState>>,
    read_version: u64,
    read_keys: BTreeSet<Vec<u8>>,
    read_prefixes: Vec<Vec<u8>>,
    writes: WriteBuffer,
    open: bool,
}

impl MemoryTransaction {
    fn ensure_open(&self) -> StorageResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(StorageError::TransactionClosed)
        }
    }

    fn read_key(&mut self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.ensure_open()?;
        if let Some(buffered) = self.writes.lookup(key) {
            return Ok(buffered);
        }

        let state = self.state.lock();
        if state.modified_since(key, self.read_version) {
            return Err(StorageError::Conflict);
        }
        let value = state.data.get(key).cloned();
        drop(state);

        self.read_keys.insert(key.to_vec());
        Ok(value)
    }

    fn read_prefix(&mut self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.ensure_open()?;

        let state = self.state.lock();
        if state.prefix_modified_since(prefix, self.read_version) {
            return Err(StorageError::Conflict);
        }
        let committed: Vec<(Vec<u8>, Vec<u8>)> = state
            .data
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        drop(state);

        self.read_prefixes.push(prefix.to_vec());
        Ok(self.writes.overlay_prefix(prefix, committed))
    }

    fn apply(&mut self) -> StorageResult<()> {
        self.ensure_open()?;
        self.open = false;

        let shared = Arc::clone(&self.state);
        let mut state = shared.lock();
        let result = self.apply_locked(&mut state);
        state.release(self.read_version);
        result
    }

    fn apply_locked(&mut self, state: &mut MemoryState) -> StorageResult<()> {
        let conflicted = self
            .read_keys
            .iter()
            .any(|key| state.modified_since(key, self.read_version))
            || self
                .read_prefixes
                .iter()
                .any(|prefix| state.prefix_modified_since(prefix, self.read_version));
        if conflicted {
            return Err(StorageError::Conflict);
        }
        if self.writes.is_empty() {
            return Ok(());
        }

        state.version += 1;
        let version = state.version;
        for (key, value) in self.writes.take() {
            match value {
                Some(value) => {
                    state.data.insert(key.clone(), value);
                }
                None => {
                    state.data.remove(&key);
                }
            }
            state.modified_at.insert(key, version);
        }
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.open {
            self.open = false;
            self.state.lock().release(self.read_version);
        }
    }
}

#[async_trait]
impl KvTransaction for MemoryTransaction {
    async fn get(&mut self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.read_key(key)
    }

    async fn get_prefix(&mut self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.read_prefix(prefix)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        if self.open {
            self.writes.set(key, value);
        }
    }

    fn clear(&mut self, key: &[u8]) {
        if self.open {
            self.writes.clear(key);
        }
    }

    async fn commit(&mut self) -> StorageResult<()> {
        self.apply()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_your_writes_and_commit() {
        let store = MemoryKeyValueStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.set(b"a", b"1");
        assert_eq!(tx.get(b"a").await.unwrap(), Some(b"1".to_vec()));
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.get(b"a").await.unwrap(), Some(b"1".to_vec()));
        tx.clear(b"a");
        assert_eq!(tx.get(b"a").await.unwrap(), None);
        tx.commit().await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_conflicting_commit_is_rejected() {
        let store = MemoryKeyValueStore::new();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        assert_eq!(first.get(b"tenant").await.unwrap(), None);
        assert_eq!(second.get(b"tenant").await.unwrap(), None);

        first.set(b"tenant", b"one");
        second.set(b"tenant", b"two");
        first.commit().await.unwrap();
        assert_eq!(second.commit().await, Err(StorageError::Conflict));

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.get(b"tenant").await.unwrap(), Some(b"one".to_vec()));
    }

    #[tokio::test]
    async fn test_prefix_read_conflicts_with_insert() {
        let store = MemoryKeyValueStore::new();

        let mut reader = store.begin().await.unwrap();
        assert!(reader.get_prefix(b"m/").await.unwrap().is_empty());

        let mut writer = store.begin().await.unwrap();
        writer.set(b"m/1", b"x");
        writer.commit().await.unwrap();

        reader.set(b"other", b"y");
        assert_eq!(reader.commit().await, Err(StorageError::Conflict));
    }

    #[tokio::test]
    async fn test_stale_read_fails_fast() {
        let store = MemoryKeyValueStore::new();
        let mut stale = store.begin().await.unwrap();

        let mut writer = store.begin().await.unwrap();
        writer.set(b"k", b"v");
        writer.commit().await.unwrap();

        assert_eq!(stale.get(b"k").await, Err(StorageError::Conflict));
    }

    #[tokio::test]
    async fn test_transaction_closes_after_commit() {
        let store = MemoryKeyValueStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.set(b"k", b"v");
        tx.commit().await.unwrap();

        assert_eq!(tx.commit().await, Err(StorageError::TransactionClosed));
        assert_eq!(tx.get(b"k").await, Err(StorageError::TransactionClosed));
        assert_eq!(store.version(), 1);
    }

    #[tokio::test]
    async fn test_stamps_are_pruned_once_no_reader_needs_them() {
        let store = MemoryKeyValueStore::new();
        let mut old_reader = store.begin().await.unwrap();
        assert_eq!(old_reader.get(b"k0").await.unwrap(), None);

        for i in 0..32u8 {
            let key = [b'k', i];
            let mut tx = store.begin().await.unwrap();
            tx.set(&key, b"v");
            tx.commit().await.unwrap();
            let mut tx = store.begin().await.unwrap();
            tx.clear(&key);
            tx.commit().await.unwrap();
        }
        let mut tx = store.begin().await.unwrap();
        tx.set(b"k0", b"late");
        tx.commit().await.unwrap();

        // The old reader still sees the write it raced with
        assert!(store.stamped_key_count() > 0);
        old_reader.set(b"other", b"x");
        assert_eq!(old_reader.commit().await, Err(StorageError::Conflict));

        assert_eq!(store.len(), 1);
        assert_eq!(store.stamped_key_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_transaction_releases_its_stamps() {
        let store = MemoryKeyValueStore::new();
        let abandoned = store.begin().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.set(b"k", b"v");
        tx.commit().await.unwrap();
        assert_eq!(store.stamped_key_count(), 1);

        drop(abandoned);
        assert_eq!(store.stamped_key_count(), 0);

        // Later transactions still conflict with each other
        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        assert!(first.get(b"k").await.unwrap().is_some());
        assert!(second.get(b"k").await.unwrap().is_some());
        first.set(b"k", b"one");
        second.set(b"k", b"two");
        first.commit().await.unwrap();
        assert_eq!(second.commit().await, Err(StorageError::Conflict));
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let store = MemoryKeyValueStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.set(b"k", b"v");
        }
        assert!(store.is_empty());
    }
}
