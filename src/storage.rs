use rocksdb::{Options, DB};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("backend failure: {0}")]
    Backend(String),
    #[error("codec failure for key '{key}': {reason}")]
    Codec { key: String, reason: String },
}

/// Synchronous string / string-list store, durable for the lifetime of the
/// backing medium.
///
/// Single values and lists live under independent keys; `put_*` overwrites.
pub trait KeyValueStore: Send + Sync {
    fn get_value(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn put_value(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn get_list(&self, key: &str) -> Result<Option<Vec<String>>, StorageError>;
    fn put_list(&self, key: &str, values: &[String]) -> Result<(), StorageError>;
}

/// RocksDB-backed store; values are bincode encoded.
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let path = Path::new(path);
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path).map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Storage { db: Arc::new(db) })
    }

    // Generic Helper: Put
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let serialized = bincode::serialize(value).map_err(|e| StorageError::Codec {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.db
            .put(key.as_bytes(), serialized)
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    // Generic Helper: Get
    pub fn get<T: for<'a> Deserialize<'a>>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.db.get(key.as_bytes()) {
            Ok(Some(data)) => {
                let deserialized = bincode::deserialize(&data).map_err(|e| StorageError::Codec {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Some(deserialized))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }
}

impl KeyValueStore for Storage {
    fn get_value(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.get::<String>(key)
    }

    fn put_value(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.put(key, &value)
    }

    fn get_list(&self, key: &str) -> Result<Option<Vec<String>>, StorageError> {
        self.get::<Vec<String>>(key)
    }

    fn put_list(&self, key: &str, values: &[String]) -> Result<(), StorageError> {
        self.put(key, &values)
    }
}

#[derive(Clone, Debug)]
enum Stored {
    Value(String),
    List(Vec<String>),
}

/// Volatile store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Stored>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, key: &str) -> Result<Option<Stored>, StorageError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: Stored) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get_value(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.read(key)? {
            Some(Stored::Value(value)) => Ok(Some(value)),
            Some(Stored::List(_)) => Err(StorageError::Codec {
                key: key.to_string(),
                reason: "expected a single value, found a list".to_string(),
            }),
            None => Ok(None),
        }
    }

    fn put_value(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.write(key, Stored::Value(value.to_string()))
    }

    fn get_list(&self, key: &str) -> Result<Option<Vec<String>>, StorageError> {
        match self.read(key)? {
            Some(Stored::List(values)) => Ok(Some(values)),
            Some(Stored::Value(_)) => Err(StorageError::Codec {
                key: key.to_string(),
                reason: "expected a list, found a single value".to_string(),
            }),
            None => Ok(None),
        }
    }

    fn put_list(&self, key: &str, values: &[String]) -> Result<(), StorageError> {
        self.write(key, Stored::List(values.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_keeps_values_and_lists_apart() {
        let store = MemoryStore::new();
        store.put_value("appuid7", "com.example.notes").unwrap();
        store
            .put_list("packageList", &["a".to_string(), "b".to_string()])
            .unwrap();

        assert_eq!(store.get_value("appuid7").unwrap().as_deref(), Some("com.example.notes"));
        assert_eq!(store.get_list("packageList").unwrap().unwrap().len(), 2);
        assert!(store.get_value("appuid8").unwrap().is_none());
        assert!(store.get_list("appuid7").is_err());
    }

    #[test]
    fn test_rocksdb_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        let path = path.to_str().unwrap();

        {
            let storage = Storage::open(path).unwrap();
            storage.put_value("appuid10042", "org.example.mail").unwrap();
            storage
                .put_list("packageList", &["org.example.mail".to_string()])
                .unwrap();
        }

        let storage = Storage::open(path).unwrap();
        assert_eq!(
            storage.get_value("appuid10042").unwrap().as_deref(),
            Some("org.example.mail")
        );
        assert_eq!(
            storage.get_list("packageList").unwrap(),
            Some(vec!["org.example.mail".to_string()])
        );
        assert_eq!(storage.get_value("missing").unwrap(), None);
    }
}
