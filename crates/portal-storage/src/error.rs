//! Storage error types.
//!
//! Every variant names the key or path involved so a failure can be traced
//! back to the record that caused it.

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to open or create the store at the given path.
    #[error("failed to open state store at '{path}': {reason}")]
    Open { path: String, reason: String },

    /// Failed to read a value.
    #[error("failed to read key '{key}': {reason}")]
    Read { key: String, reason: String },

    /// Failed to write a value.
    #[error("failed to write key '{key}': {reason}")]
    Write { key: String, reason: String },

    /// Failed to delete a key.
    #[error("failed to delete key '{key}': {reason}")]
    Delete { key: String, reason: String },

    /// The key contains characters that cannot be stored.
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },
}
