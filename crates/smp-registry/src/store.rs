//! # Write-Through Stores
//!
//! Every collection of the registry lives in a [`Store`]: a thread-safe,
//! cloneable ordered map whose mutations are written through to a
//! [`StoreBackend`] before they become visible.
//!
//! All operations are synchronous (`parking_lot::RwLock`); the lock is never
//! held across an `.await`. If the backend rejects a write, the in-memory
//! change is undone and [`StoreError::Persistence`] is returned, so memory
//! and disk never diverge.
//!
//! ## Backends
//!
//! - [`MemoryBackend`]: nothing is persisted.
//! - [`JsonFileBackend`]: one `<collection>.json` file per store, replaced
//!   atomically through a temporary file in the same directory.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A value that can be kept in a [`Store`].
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Primary key type.
    type Key: Ord + Clone + std::fmt::Debug + Send + Sync + 'static;

    /// Primary key of this value.
    fn key(&self) -> Self::Key;
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// Durable storage for the serialized form of one collection.
pub trait StoreBackend: Send + Sync {
    /// Serialized collection, or `None` if nothing was stored yet.
    fn load(&self) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace the stored collection.
    fn persist(&self, bytes: &[u8]) -> Result<(), StoreError>;

    /// Whether writes reach durable storage. Non-durable backends skip
    /// serialization entirely.
    fn is_durable(&self) -> bool {
        true
    }
}

/// Backend that keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryBackend;

impl StoreBackend for MemoryBackend {
    fn load(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(None)
    }

    fn persist(&self, _bytes: &[u8]) -> Result<(), StoreError> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }
}

/// Backend writing one JSON file per collection.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    dir: PathBuf,
    path: PathBuf,
}

impl JsonFileBackend {
    /// Backend for `<dir>/<collection>.json`.
    pub fn new(dir: impl Into<PathBuf>, collection: &str) -> Self {
        let dir = dir.into();
        let path = dir.join(format!("{collection}.json"));
        Self { dir, path }
    }

    /// Path of the collection file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StoreBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<Vec<u8>>, StoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn persist(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        tmp.write_all(bytes).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

/// Factory for per-collection backends.
pub trait Storage {
    /// Backend for the named collection.
    fn backend(&self, collection: &'static str) -> Result<Arc<dyn StoreBackend>, StoreError>;
}

/// In-memory storage: every collection starts empty and nothing survives.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryStorage;

impl Storage for MemoryStorage {
    fn backend(&self, _collection: &'static str) -> Result<Arc<dyn StoreBackend>, StoreError> {
        Ok(Arc::new(MemoryBackend))
    }
}

/// File storage rooted at a data directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Storage in `dir`, created if missing.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Data directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Storage for FileStorage {
    fn backend(&self, collection: &'static str) -> Result<Arc<dyn StoreBackend>, StoreError> {
        Ok(Arc::new(JsonFileBackend::new(self.dir.clone(), collection)))
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Thread-safe, cloneable, write-through ordered map.
pub struct Store<V: Record> {
    collection: &'static str,
    data: Arc<RwLock<BTreeMap<V::Key, V>>>,
    backend: Arc<dyn StoreBackend>,
}

impl<V: Record> Clone for Store<V> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection,
            data: Arc::clone(&self.data),
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<V: Record> std::fmt::Debug for Store<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("collection", &self.collection)
            .field("len", &self.len())
            .finish()
    }
}

impl<V: Record> Store<V> {
    /// Open the collection from `storage`, loading whatever it holds.
    pub fn open(storage: &dyn Storage, collection: &'static str) -> Result<Self, StoreError> {
        Self::with_backend(collection, storage.backend(collection)?)
    }

    /// Open the collection over an explicit backend.
    pub fn with_backend(
        collection: &'static str,
        backend: Arc<dyn StoreBackend>,
    ) -> Result<Self, StoreError> {
        let mut map = BTreeMap::new();
        if let Some(bytes) = backend.load()? {
            let values: Vec<V> =
                serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                    path: PathBuf::from(format!("{collection}.json")),
                    source,
                })?;
            for value in values {
                map.insert(value.key(), value);
            }
            tracing::debug!(collection, records = map.len(), "loaded collection");
        }
        Ok(Self {
            collection,
            data: Arc::new(RwLock::new(map)),
            backend,
        })
    }

    /// Empty in-memory store.
    pub fn in_memory(collection: &'static str) -> Self {
        Self {
            collection,
            data: Arc::new(RwLock::new(BTreeMap::new())),
            backend: Arc::new(MemoryBackend),
        }
    }

    /// In-memory store pre-filled with `values`.
    pub fn in_memory_with(collection: &'static str, values: impl IntoIterator<Item = V>) -> Self {
        let map = values.into_iter().map(|v| (v.key(), v)).collect();
        Self {
            collection,
            data: Arc::new(RwLock::new(map)),
            backend: Arc::new(MemoryBackend),
        }
    }

    /// Collection name.
    pub fn collection(&self) -> &'static str {
        self.collection
    }

    /// Retrieve a record by key.
    pub fn get(&self, key: &V::Key) -> Option<V> {
        self.data.read().get(key).cloned()
    }

    /// Whether a record with `key` exists.
    pub fn contains(&self, key: &V::Key) -> bool {
        self.data.read().contains_key(key)
    }

    /// All records in key order.
    pub fn list(&self) -> Vec<V> {
        self.data.read().values().cloned().collect()
    }

    /// Records matching `predicate`, in key order.
    pub fn values_where(&self, predicate: impl Fn(&V) -> bool) -> Vec<V> {
        self.data
            .read()
            .values()
            .filter(|v| predicate(v))
            .cloned()
            .collect()
    }

    /// Whether any record matches `predicate`.
    pub fn any(&self, predicate: impl Fn(&V) -> bool) -> bool {
        self.data.read().values().any(predicate)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert `value` unless its key is taken.
    ///
    /// Returns `false` (and changes nothing) when the key already exists.
    pub fn insert(&self, value: V) -> Result<bool, StoreError> {
        let mut guard = self.data.write();
        let key = value.key();
        if guard.contains_key(&key) {
            return Ok(false);
        }
        guard.insert(key.clone(), value);
        if let Err(e) = self.persist_locked(&guard) {
            guard.remove(&key);
            return Err(e);
        }
        Ok(true)
    }

    /// Insert or replace `value`, returning the previous record.
    pub fn replace(&self, value: V) -> Result<Option<V>, StoreError> {
        let mut guard = self.data.write();
        let key = value.key();
        let previous = guard.insert(key.clone(), value);
        if let Err(e) = self.persist_locked(&guard) {
            match &previous {
                Some(old) => guard.insert(key, old.clone()),
                None => guard.remove(&key),
            };
            return Err(e);
        }
        Ok(previous)
    }

    /// Remove the record with `key`, returning it.
    pub fn remove(&self, key: &V::Key) -> Result<Option<V>, StoreError> {
        let mut guard = self.data.write();
        let Some(previous) = guard.remove(key) else {
            return Ok(None);
        };
        if let Err(e) = self.persist_locked(&guard) {
            guard.insert(key.clone(), previous);
            return Err(e);
        }
        Ok(Some(previous))
    }

    /// Remove every record matching `predicate`, returning the removed ones.
    pub fn remove_where(&self, predicate: impl Fn(&V) -> bool) -> Result<Vec<V>, StoreError> {
        let mut guard = self.data.write();
        let keys: Vec<V::Key> = guard
            .iter()
            .filter(|(_, v)| predicate(v))
            .map(|(k, _)| k.clone())
            .collect();
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let removed: Vec<V> = keys.iter().filter_map(|k| guard.remove(k)).collect();
        if let Err(e) = self.persist_locked(&guard) {
            for value in removed {
                guard.insert(value.key(), value);
            }
            return Err(e);
        }
        Ok(removed)
    }

    /// Atomically read-validate-replace a record.
    ///
    /// The closure sees the current value and returns its replacement or an
    /// error. The whole operation runs under one write lock. Returns
    /// `Ok(None)` when `key` does not exist.
    pub fn try_update<E>(
        &self,
        key: &V::Key,
        f: impl FnOnce(&V) -> Result<V, E>,
    ) -> Result<Option<V>, E>
    where
        E: From<StoreError>,
    {
        let mut guard = self.data.write();
        let Some(current) = guard.get(key).cloned() else {
            return Ok(None);
        };
        let updated = f(&current)?;
        guard.insert(key.clone(), updated.clone());
        if let Err(e) = self.persist_locked(&guard) {
            guard.insert(key.clone(), current);
            return Err(e.into());
        }
        Ok(Some(updated))
    }

    fn persist_locked(&self, map: &BTreeMap<V::Key, V>) -> Result<(), StoreError> {
        if !self.backend.is_durable() {
            return Ok(());
        }
        let values: Vec<&V> = map.values().collect();
        let bytes =
            serde_json::to_vec_pretty(&values).map_err(|e| StoreError::Persistence {
                collection: self.collection,
                reason: e.to_string(),
            })?;
        self.backend
            .persist(&bytes)
            .map_err(|e| StoreError::Persistence {
                collection: self.collection,
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: u32,
        label: String,
    }

    impl Record for Item {
        type Key = u32;
        fn key(&self) -> u32 {
            self.id
        }
    }

    fn item(id: u32, label: &str) -> Item {
        Item {
            id,
            label: label.to_string(),
        }
    }

    /// Backend that rejects any write whose serialized form contains `poison`.
    pub(crate) struct FailingBackend {
        pub(crate) poison: &'static str,
    }

    impl StoreBackend for FailingBackend {
        fn load(&self) -> Result<Option<Vec<u8>>, StoreError> {
            Ok(None)
        }

        fn persist(&self, bytes: &[u8]) -> Result<(), StoreError> {
            if String::from_utf8_lossy(bytes).contains(self.poison) {
                return Err(StoreError::Persistence {
                    collection: "test",
                    reason: "disk full".to_string(),
                });
            }
            Ok(())
        }
    }

    fn failing_store() -> Store<Item> {
        Store::with_backend("items", Arc::new(FailingBackend { poison: "poison" })).unwrap()
    }

    #[test]
    fn insert_rejects_existing_key() {
        let store = Store::in_memory("items");
        assert!(store.insert(item(1, "a")).unwrap());
        assert!(!store.insert(item(1, "b")).unwrap());
        assert_eq!(store.get(&1).unwrap().label, "a");
    }

    #[test]
    fn replace_returns_previous() {
        let store = Store::in_memory("items");
        assert!(store.replace(item(1, "a")).unwrap().is_none());
        let previous = store.replace(item(1, "b")).unwrap().unwrap();
        assert_eq!(previous.label, "a");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_where_removes_matching() {
        let store = Store::in_memory("items");
        for i in 0..5 {
            store.insert(item(i, if i % 2 == 0 { "even" } else { "odd" })).unwrap();
        }
        let removed = store.remove_where(|v| v.label == "even").unwrap();
        assert_eq!(removed.len(), 3);
        assert_eq!(store.len(), 2);
        assert!(store.remove_where(|v| v.label == "even").unwrap().is_empty());
    }

    #[test]
    fn failed_insert_is_rolled_back() {
        let store = failing_store();
        store.insert(item(1, "fine")).unwrap();
        let err = store.insert(item(2, "poison")).unwrap_err();
        assert!(matches!(err, StoreError::Persistence { .. }));
        assert!(!store.contains(&2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn failed_replace_restores_previous_value() {
        let store = failing_store();
        store.insert(item(1, "fine")).unwrap();
        assert!(store.replace(item(1, "poison")).is_err());
        assert_eq!(store.get(&1).unwrap().label, "fine");
    }

    #[test]
    fn failed_try_update_keeps_current_value() {
        let store = failing_store();
        store.insert(item(1, "fine")).unwrap();
        let result: Result<_, StoreError> = store.try_update(&1, |v| {
            let mut next = v.clone();
            next.label = "poison".to_string();
            Ok(next)
        });
        assert!(result.is_err());
        assert_eq!(store.get(&1).unwrap().label, "fine");
    }

    #[test]
    fn try_update_missing_key_is_none() {
        let store: Store<Item> = Store::in_memory("items");
        let result: Result<_, StoreError> = store.try_update(&7, |v| Ok(v.clone()));
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn file_backend_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        {
            let store: Store<Item> = Store::open(&storage, "items").unwrap();
            store.insert(item(2, "two")).unwrap();
            store.insert(item(1, "one")).unwrap();
            store.remove(&2).unwrap();
        }
        let reopened: Store<Item> = Store::open(&storage, "items").unwrap();
        assert_eq!(reopened.list(), vec![item(1, "one")]);
        assert!(dir.path().join("items.json").exists());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("items.json"), b"{not json").unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        let err = Store::<Item>::open(&storage, "items").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
