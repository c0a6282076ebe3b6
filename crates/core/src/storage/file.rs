use super::{KeyValueStore, StoredValue};
use crate::CoreResult;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Durable store backed by a single JSON file
///
/// The file is loaded once on open and rewritten on every mutation. Writes go
/// to a sibling temporary file that is then renamed over the original, so a
/// crash mid-write leaves the previous contents intact.
///
/// Writes are blocking file I/O and run on the calling thread, including from
/// the async refresh path. Meant for a single-user process such as the CLI,
/// where the store holds a handful of keys.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, StoredValue>>,
}

impl FileStore {
    /// Open the store at `path`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or an existing file
    /// cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), entries = entries.len(), "opened file store");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, StoredValue>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, entries: &mut BTreeMap<String, StoredValue>) -> CoreResult<()> {
        entries.retain(|_, entry| !entry.is_expired());
        let content = serde_json::to_string_pretty(&*entries)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self
            .lock()
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone()))
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> CoreResult<()> {
        let mut entries = self.lock();
        entries.insert(key.to_string(), StoredValue::new(value, ttl));
        self.persist(&mut entries)
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        let mut entries = self.lock();
        if entries.remove(key).is_some() {
            self.persist(&mut entries)?;
        }
        Ok(())
    }
}
