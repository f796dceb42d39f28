//! File-backed state store.
//!
//! Each key is stored as its own file inside a state directory
//! (`~/.portal/portal.session`, `~/.portal/portal.location`, ...). Files are
//! written with owner-only permissions on Unix because the session record
//! carries a bearer token.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{StateStore, StorageError};

/// A store that keeps one file per key in a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = dir.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StorageError::Open {
                path: root.display().to_string(),
                reason: e.to_string(),
            })?;
        debug!(path = %root.display(), "opened file state store");
        Ok(Self { root })
    }

    /// The directory this store writes into.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

/// Keys become file names, so only a conservative character set is allowed.
fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey {
            key: key.to_owned(),
            reason: "key is empty".to_owned(),
        });
    }
    if key.starts_with('.') {
        return Err(StorageError::InvalidKey {
            key: key.to_owned(),
            reason: "key must not start with '.'".to_owned(),
        });
    }
    if let Some(bad) = key
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')))
    {
        return Err(StorageError::InvalidKey {
            key: key.to_owned(),
            reason: format!("unsupported character {bad:?}"),
        });
    }
    Ok(())
}

#[async_trait::async_trait]
impl StateStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| StorageError::Read {
                    key: key.to_owned(),
                    reason: e.to_string(),
                }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Read {
                key: key.to_owned(),
                reason: e.to_string(),
            }),
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let write_err = |e: std::io::Error| StorageError::Write {
            key: key.to_owned(),
            reason: e.to_string(),
        };

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&path).await.map_err(write_err)?;
        file.write_all(value.as_bytes()).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;

        // the creation mode does not apply to files left by earlier runs
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&path, perms)
                .await
                .map_err(write_err)?;
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Delete {
                key: key.to_owned(),
                reason: e.to_string(),
            }),
        }
    }
}
