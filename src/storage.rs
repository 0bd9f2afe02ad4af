//! Key-Value Storage
//!
//! The persistence boundary of the mission manager. Writes are synchronous
//! and best-effort; the manager logs failures and carries on in memory.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use crate::error::StoreError;

/// Storage the mission manager reads at startup and writes after mutations
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

/// In-process store. Clones share the same entries, so a caller can keep a
/// handle to what the manager wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// One JSON file per key inside a directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Open the store, creating the directory if needed
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        // Write then rename so a crash never leaves a half-written snapshot
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value.as_bytes())?;
        fs::rename(&tmp, &path)?;
        debug!("Wrote {} bytes to {:?}", value.len(), path);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_clones_share_entries() {
        let mut store = MemoryStore::new();
        let handle = store.clone();
        store.set("mission_state", "{}").unwrap();
        assert_eq!(handle.get("mission_state").unwrap().as_deref(), Some("{}"));

        store.remove("mission_state").unwrap();
        assert!(handle.is_empty());
    }

    #[test]
    fn test_json_file_store() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = JsonFileStore::new(temp_dir.path().join("state")).unwrap();

        assert_eq!(store.get("mission_state").unwrap(), None);
        store.set("mission_state", r#"{"version":1}"#).unwrap();
        assert_eq!(
            store.get("mission_state").unwrap().as_deref(),
            Some(r#"{"version":1}"#)
        );
        assert!(temp_dir.path().join("state").join("mission_state.json").exists());

        store.remove("mission_state").unwrap();
        store.remove("mission_state").unwrap();
        assert_eq!(store.get("mission_state").unwrap(), None);
    }

    #[test]
    fn test_json_file_store_rejects_path_keys() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = JsonFileStore::new(temp_dir.path()).unwrap();
        assert!(matches!(
            store.set("../escape", "{}"),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(store.get("").is_err());
    }
}
