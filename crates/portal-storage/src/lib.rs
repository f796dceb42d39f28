//! Durable client-side state store for Portal.
//!
//! This crate defines the [`StateStore`] trait, a small text key-value
//! interface that knows nothing about sessions, filters, or views. The engine
//! in `portal-core` keeps every persisted record (the session, the filter
//! caches, the last analytics range) behind this trait, so the single-writer
//! rules for those records can be enforced in one place.
//!
//! Two implementations are provided:
//!
//! - [`FileStore`]: one file per key inside a state directory
//! - [`MemoryStore`]: in-memory, for tests and ephemeral hosts

mod error;
mod file;
mod memory;

pub use error::StorageError;
pub use file::FileStore;
pub use memory::MemoryStore;

/// A pluggable text key-value store.
///
/// Keys are short fixed names such as `portal.session`. Values are UTF-8
/// text (usually JSON or a query string); callers own their encoding and must
/// treat undecodable values as absent.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// Retrieve a value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying store fails.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store a value, overwriting any existing one.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying store fails.
    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a key. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the underlying store fails.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists.
    ///
    /// The default implementation calls [`get`](StateStore::get) and checks
    /// for `Some`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying store fails.
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }
}
