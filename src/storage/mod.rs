//! Key-value persistence for queue snapshots and the error log
//!
//! The resilience layer persists two documents: the offline queue snapshot
//! and the error-log ring buffer, each under a fixed, versioned key. The
//! [`KeyValueStore`] trait is the seam to the host platform's storage; the
//! crate ships an in-memory store and a file-backed store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{ResilienceError, Result};

/// Storage key for the serialized offline queue snapshot
pub const OFFLINE_QUEUE_KEY: &str = "amoria.offline_queue.v1";

/// Storage key for the serialized error-log ring buffer
pub const ERROR_LOG_KEY: &str = "amoria.error_log.v1";

/// Async key-value persistence provider
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, if any
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove the value stored under `key`
    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store. Contents are lost on restart; intended for tests and
/// for hosts that supply no durable storage.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// File-backed store: one file per key under a data directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created lazily on
    /// first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create a store under the platform data directory.
    pub fn default_location() -> Result<Self> {
        let base = dirs::data_dir()
            .ok_or_else(|| ResilienceError::storage("no platform data directory available"))?;
        Ok(Self::new(base.join("amoria").join("resilience")))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are dotted identifiers; anything else is flattened so a key
        // can never escape the store directory.
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ResilienceError::storage(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ResilienceError::storage(format!("failed to create store dir: {e}")))?;
        let path = self.path_for(key);
        // Write to a sibling temp file and rename so readers never observe a
        // partially written snapshot.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value)
            .await
            .map_err(|e| ResilienceError::storage(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| ResilienceError::storage(format!("failed to commit {}: {e}", path.display())))?;
        debug!(key, bytes = value.len(), "persisted snapshot");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ResilienceError::storage(format!(
                "failed to remove {}: {e}",
                path.display()
            ))),
        }
    }
}
