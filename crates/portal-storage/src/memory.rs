//! In-memory state store.
//!
//! Data lives in a `BTreeMap` behind a `RwLock` and is lost when the process
//! exits. Clones share the same map, which lets a test hold a handle to the
//! store it gave to the engine.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{StateStore, StorageError};

/// An in-memory store backed by a `BTreeMap`.
///
/// # Examples
///
/// ```
/// # use portal_storage::{MemoryStore, StateStore};
/// # #[tokio::main]
/// # async fn main() {
/// let store = MemoryStore::new();
/// store.put("portal.analytics.range", "7d").await.unwrap();
/// let val = store.get("portal.analytics.range").await.unwrap();
/// assert_eq!(val.as_deref(), Some("7d"));
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Whether the store holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let data = self.data.read().await;
        Ok(data.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut data = self.data.write().await;
        data.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut data = self.data.write().await;
        data.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let data = self.data.read().await;
        Ok(data.contains_key(key))
    }
}
