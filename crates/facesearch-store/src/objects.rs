//! Object storage for uploaded images.

use async_trait::async_trait;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Directory used when an upload names none.
pub const DEFAULT_DIRECTORY: &str = "face-images";

#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("invalid object key: {0:?}")]
    InvalidKey(String),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("io error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// A stored object as seen by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    pub key: String,
    pub url: String,
    pub size: u64,
}

/// Byte storage addressed by slash-separated keys.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, returning the object's URL.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, ObjectStoreError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError>;

    /// Remove the given keys; missing keys are skipped. Returns how many were removed.
    async fn delete_many(&self, keys: &[String]) -> Result<usize, ObjectStoreError>;

    /// Objects directly under `prefix/`, sorted by key. Keys in nested
    /// directories are not included.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, ObjectStoreError>;

    fn url_for(&self, key: &str) -> String;
}

/// Normalize a caller-supplied directory name into a key prefix.
pub fn clean_directory(directory: &str) -> String {
    let trimmed = directory.trim().trim_matches('/');
    if trimmed.is_empty() {
        DEFAULT_DIRECTORY.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Fresh object key `<directory>/<uuid><ext>`.
pub fn object_key(directory: &str, ext: &str) -> String {
    format!("{}/{}{}", clean_directory(directory), uuid::Uuid::new_v4(), ext)
}

/// Reject keys that could escape the store root.
fn validate_key(key: &str) -> Result<&Path, ObjectStoreError> {
    let path = Path::new(key);
    let ok = !key.is_empty()
        && !key.contains('\\')
        && path.components().all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(path)
    } else {
        Err(ObjectStoreError::InvalidKey(key.to_string()))
    }
}

/// [`ObjectStore`] on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    base_url: String,
}

impl LocalObjectStore {
    /// `base_url` is the public prefix objects are served under
    /// (e.g. `http://localhost:8000/objects`).
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        Ok(self.root.join(validate_key(key)?))
    }
}

fn io_err(key: &str) -> impl FnOnce(std::io::Error) -> ObjectStoreError + '_ {
    move |source| ObjectStoreError::Io {
        key: key.to_string(),
        source,
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, ObjectStoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err(key))?;
        }
        let size = bytes.len();
        tokio::fs::write(&path, bytes).await.map_err(io_err(key))?;

        let url = self.url_for(key);
        tracing::info!(key, size, content_type, %url, "stored object");
        Ok(url)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ObjectStoreError::NotFound(key.to_string())),
            Err(e) => Err(io_err(key)(e)),
        }
    }

    async fn delete_many(&self, keys: &[String]) -> Result<usize, ObjectStoreError> {
        let mut removed = 0;
        for key in keys {
            let path = self.path_for(key)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!(%key, "object already absent");
                }
                Err(e) => {
                    tracing::warn!(%key, error = %e, "failed to delete object");
                }
            }
        }
        tracing::info!(requested = keys.len(), removed, "deleted objects");
        Ok(removed)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, ObjectStoreError> {
        let prefix = clean_directory(prefix);
        let dir = self.path_for(&prefix)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&prefix)(e)),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err(&prefix))? {
            let meta = entry.metadata().await.map_err(io_err(&prefix))?;
            // Nested folders are directories of their own.
            if !meta.is_file() {
                continue;
            }
            let key = format!("{}/{}", prefix, entry.file_name().to_string_lossy());
            found.push(ObjectInfo {
                url: self.url_for(&key),
                key,
                size: meta.len(),
            });
        }

        found.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(found)
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}
