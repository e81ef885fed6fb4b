use crate::error::{ChatError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

/// Minimal persistent string store, scoped to the local client.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Flat JSON object on disk. Writes land in a sibling temp file that is then
/// renamed over the original, so readers never observe a partial file.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| ChatError::Storage(format!("Failed to read {}: {}", self.path.display(), e)))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content)
            .map_err(|e| ChatError::Storage(format!("Failed to parse {}: {}", self.path.display(), e)))
    }

    fn write_atomic(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let storage_err = |e: std::io::Error| ChatError::Storage(e.to_string());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(storage_err)?;
        }

        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| ChatError::Storage(e.to_string()))?;

        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp_path).map_err(storage_err)?;
            file.write_all(content.as_bytes()).map_err(storage_err)?;
            file.sync_all().map_err(storage_err)?;
        }
        fs::rename(&tmp_path, &self.path).map_err(storage_err)?;

        debug!(path = %self.path.display(), "storage written");
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| ChatError::Storage("storage lock poisoned".to_string()))?;
        Ok(self.load()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| ChatError::Storage("storage lock poisoned".to_string()))?;
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_atomic(&entries)
    }
}

/// In-process store, used where persistence across restarts is not wanted.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| ChatError::Storage("storage lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ChatError::Storage("storage lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
