//! Key-value persistence for knowledge base entries

use crate::entry::KnowledgeBaseEntry;
use crate::error::KnowledgeError;
use crate::normalize::NormalizedKey;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Persistence collaborator for knowledge base entries
///
/// Implementations must make each `put` atomic: a concurrent `get` sees
/// either the previous entry or the new one, never a mix.
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the entry stored under `key`
    fn get(&self, key: &NormalizedKey) -> Result<Option<KnowledgeBaseEntry>, KnowledgeError>;

    /// Store `entry` under `key`, replacing any previous value
    fn put(&self, key: &NormalizedKey, entry: &KnowledgeBaseEntry) -> Result<(), KnowledgeError>;
}

/// Volatile store, used for tests and single-run tooling
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<NormalizedKey, KnowledgeBaseEntry>>,
}

impl MemoryStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &NormalizedKey) -> Result<Option<KnowledgeBaseEntry>, KnowledgeError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &NormalizedKey, entry: &KnowledgeBaseEntry) -> Result<(), KnowledgeError> {
        self.entries.write().insert(key.clone(), entry.clone());
        Ok(())
    }
}

/// JSON-file store surviving process restarts
///
/// The whole map is rewritten on every `put` through a temporary file in
/// the same directory that is renamed over the target.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<NormalizedKey, KnowledgeBaseEntry>>,
}

impl JsonFileStore {
    /// Open `path`, starting empty when the file does not exist yet
    ///
    /// # Errors
    /// - `KnowledgeError::Io` if the file or its directory cannot be accessed
    /// - `KnowledgeError::Corrupt` if the file is not a valid entry map
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KnowledgeError> {
        let path = path.as_ref().to_path_buf();

        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| KnowledgeError::Corrupt {
                path: path.clone(),
                message: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| KnowledgeError::io(parent, e))?;
                }
                BTreeMap::new()
            }
            Err(e) => return Err(KnowledgeError::io(&path, e)),
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "opened knowledge base file");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Backing file path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomically(&self, entries: &BTreeMap<NormalizedKey, KnowledgeBaseEntry>) -> Result<(), KnowledgeError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let json = serde_json::to_vec_pretty(entries)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| KnowledgeError::io(dir, e))?;
        tmp.write_all(&json).map_err(|e| KnowledgeError::io(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| KnowledgeError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| KnowledgeError::io(&self.path, e.error))?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &NormalizedKey) -> Result<Option<KnowledgeBaseEntry>, KnowledgeError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &NormalizedKey, entry: &KnowledgeBaseEntry) -> Result<(), KnowledgeError> {
        let mut entries = self.entries.lock();
        let previous = entries.insert(key.clone(), entry.clone());
        if let Err(e) = self.write_atomically(&entries) {
            match previous {
                Some(prev) => entries.insert(key.clone(), prev),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::MappingSource;
    use crate::normalize::normalize;

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        let key = normalize("qty");
        let entry = KnowledgeBaseEntry::new(key.as_str(), "Quantity", 0.8, MappingSource::ModelInferred);

        store.put(&key, &entry).unwrap();

        assert_eq!(store.get(&key).unwrap(), Some(entry));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("kb.json");
        let key = normalize("cust_id");
        let entry = KnowledgeBaseEntry::new(key.as_str(), "Customer ID", 0.9, MappingSource::ModelInferred);

        {
            let store = JsonFileStore::open(&path).unwrap();
            store.put(&key, &entry).unwrap();
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get(&key).unwrap(), Some(entry));
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonFileStore::open(&path).unwrap_err();
        assert!(matches!(err, KnowledgeError::Corrupt { .. }));
    }

    #[test]
    fn empty_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(&path, "").unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get(&normalize("qty")).unwrap(), None);
    }
}
