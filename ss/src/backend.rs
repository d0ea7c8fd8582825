//! Persistence backends
//!
//! The host's persistence layer is an opaque key-value store. [`StateBackend`]
//! is the seam: single-key get/set only, no transactional multi-key writes.
//! Two implementations ship with the crate: an in-memory map for tests and
//! embedding, and a single-file JSON store for standalone use.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::error::StoreResult;

/// An opaque key-value persistence layer
///
/// Implementations must treat each `set` as durable on return; the store
/// never batches or retries writes.
pub trait StateBackend: Send {
    /// Read a value, `None` if the key was never written
    fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Write a value, replacing any previous one
    fn set(&mut self, key: &str, value: Value) -> StoreResult<()>;

    /// All keys currently present, in stable order
    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Remove every key
    fn clear(&mut self) -> StoreResult<()>;
}

/// In-memory backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: BTreeMap<String, Value>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateBackend for MemoryBackend {
    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> StoreResult<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.values.keys().cloned().collect())
    }

    fn clear(&mut self) -> StoreResult<()> {
        self.values.clear();
        Ok(())
    }
}

/// Single-file JSON backend
///
/// The whole keyspace lives in one `state.json` object. Every write rewrites
/// the file; reads go to the in-memory copy loaded at open.
pub struct FileBackend {
    path: PathBuf,
    values: BTreeMap<String, Value>,
}

impl FileBackend {
    /// Open or create a file backend rooted at the given directory
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join("state.json");
        debug!(?path, "FileBackend::open");

        let values = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str::<BTreeMap<String, Value>>(&content)?
        } else {
            BTreeMap::new()
        };

        Ok(Self { path, values })
    }

    fn flush(&self) -> StoreResult<()> {
        let content = serde_json::to_string_pretty(&self.values)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

impl StateBackend for FileBackend {
    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> StoreResult<()> {
        debug!(%key, "FileBackend::set");
        self.values.insert(key.to_string(), value);
        self.flush()
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.values.keys().cloned().collect())
    }

    fn clear(&mut self) -> StoreResult<()> {
        debug!("FileBackend::clear");
        self.values.clear();
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_memory_backend_roundtrip() {
        let mut backend = MemoryBackend::new();
        assert!(backend.get("missing").unwrap().is_none());

        backend.set("a", json!(1)).unwrap();
        backend.set("b", json!({"nested": true})).unwrap();

        assert_eq!(backend.get("a").unwrap(), Some(json!(1)));
        assert_eq!(backend.keys().unwrap(), vec!["a", "b"]);

        backend.clear().unwrap();
        assert!(backend.keys().unwrap().is_empty());
    }

    #[test]
    fn test_memory_backend_set_replaces() {
        let mut backend = MemoryBackend::new();
        backend.set("k", json!("old")).unwrap();
        backend.set("k", json!("new")).unwrap();
        assert_eq!(backend.get("k").unwrap(), Some(json!("new")));
    }

    #[test]
    fn test_file_backend_persists_across_open() {
        let temp = tempdir().unwrap();

        {
            let mut backend = FileBackend::open(temp.path()).unwrap();
            backend.set("setting", json!(42)).unwrap();
        }

        let backend = FileBackend::open(temp.path()).unwrap();
        assert_eq!(backend.get("setting").unwrap(), Some(json!(42)));
    }

    #[test]
    fn test_file_backend_clear_persists() {
        let temp = tempdir().unwrap();

        {
            let mut backend = FileBackend::open(temp.path()).unwrap();
            backend.set("setting", json!(42)).unwrap();
            backend.clear().unwrap();
        }

        let backend = FileBackend::open(temp.path()).unwrap();
        assert!(backend.get("setting").unwrap().is_none());
    }
}
