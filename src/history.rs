//! Recently rendered images, most recent first.
//!
//! The list is stored as a JSON array of data-URL strings under a single key
//! of a [`KeyValueStore`]. Every operation is best effort: storage and parse
//! errors are logged and never reach the caller.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, error, warn};

use crate::error::SnapError;

pub const HISTORY_KEY: &str = "base64ImageHistory";
pub const MAX_HISTORY_SIZE: usize = 12;

/// String key/value persistence, modeled on browser `localStorage`.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, SnapError>;
    fn set(&self, key: &str, value: &str) -> Result<(), SnapError>;
    fn remove(&self, key: &str) -> Result<(), SnapError>;
}

#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, SnapError> {
        let items = self
            .items
            .lock()
            .map_err(|_| SnapError::Storage("memory store lock poisoned".into()))?;
        Ok(items.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SnapError> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| SnapError::Storage("memory store lock poisoned".into()))?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SnapError> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| SnapError::Storage("memory store lock poisoned".into()))?;
        items.remove(key);
        Ok(())
    }
}

/// A JSON object on disk mapping keys to string values.
///
/// Writes go to a sibling temp file that is then renamed over the original.
/// A file that does not parse is overwritten by the next write. There is no
/// cross-process locking; concurrent writers are last-write-wins.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<HashMap<String, String>, SnapError> {
        match std::fs::read(&self.path) {
            Ok(raw) if raw.iter().all(u8::is_ascii_whitespace) => Ok(HashMap::new()),
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Current map for a write. A file that is not a JSON object is replaced
    /// by an empty map; the flag reports that the file needs rewriting.
    fn read_map_for_write(&self) -> Result<(HashMap<String, String>, bool), SnapError> {
        match self.read_map() {
            Ok(map) => Ok((map, false)),
            Err(SnapError::Json(e)) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "store file is damaged, starting over"
                );
                Ok((HashMap::new(), true))
            }
            Err(e) => Err(e),
        }
    }

    fn write_map(&self, map: &HashMap<String, String>) -> Result<(), SnapError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(map)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn locked(&self) -> Result<std::sync::MutexGuard<'_, ()>, SnapError> {
        self.lock
            .lock()
            .map_err(|_| SnapError::Storage("file store lock poisoned".into()))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, SnapError> {
        let _guard = self.locked()?;
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SnapError> {
        let _guard = self.locked()?;
        let (mut map, _) = self.read_map_for_write()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> Result<(), SnapError> {
        let _guard = self.locked()?;
        let (mut map, damaged) = self.read_map_for_write()?;
        if map.remove(key).is_some() || damaged {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

/// Bounded, de-duplicated list of data URLs persisted under [`HISTORY_KEY`].
pub struct ImageHistory<S> {
    store: S,
}

impl<S: KeyValueStore> ImageHistory<S> {
    pub fn new(store: S) -> Self {
        ImageHistory { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Stored entries, most recent first. Returns an empty list when nothing
    /// is stored or the stored value cannot be read.
    pub fn get_history(&self) -> Vec<String> {
        let raw = match self.store.get(HISTORY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                error!(error = %e, "failed to read image history");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(entries) => normalize(entries),
            Err(e) => {
                error!(error = %e, "failed to parse image history");
                Vec::new()
            }
        }
    }

    /// Move `entry` to the front, dropping any older copy and anything past
    /// the twelfth slot.
    pub fn add_to_history(&self, entry: &str) {
        let mut entries = self.get_history();
        entries.retain(|e| e != entry);
        entries.insert(0, entry.to_string());
        entries.truncate(MAX_HISTORY_SIZE);

        let json = match serde_json::to_string(&entries) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "failed to serialize image history");
                return;
            }
        };
        match self.store.set(HISTORY_KEY, &json) {
            Ok(()) => debug!(len = entries.len(), "image history updated"),
            Err(e) => warn!(error = %e, "failed to add item to image history"),
        }
    }

    pub fn clear_history(&self) {
        if let Err(e) = self.store.remove(HISTORY_KEY) {
            warn!(error = %e, "failed to clear image history");
        }
    }
}

/// Enforce the size and uniqueness bounds on data read back from storage.
fn normalize(entries: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(entries.len().min(MAX_HISTORY_SIZE));
    for entry in entries {
        if out.len() == MAX_HISTORY_SIZE {
            break;
        }
        if !out.contains(&entry) {
            out.push(entry);
        }
    }
    out
}
