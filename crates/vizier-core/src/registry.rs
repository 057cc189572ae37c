//! Parsed datasets handed over by the file-handling collaborator

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use ulid::Ulid;
use vizier_plan::Dataset;

/// Opaque identifier of an uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    /// Wrap an identifier assigned elsewhere
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh unique identifier
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Identifier text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Lookup of already-parsed datasets by file identifier
pub trait DatasetRegistry: Send + Sync {
    /// Dataset registered under `file_id`
    fn get(&self, file_id: &FileId) -> Option<Arc<Dataset>>;
}

/// Concurrent in-process registry
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    datasets: DashMap<FileId, Arc<Dataset>>,
}

impl InMemoryRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `dataset` under a generated identifier
    pub fn register(&self, dataset: Dataset) -> FileId {
        let file_id = FileId::generate();
        self.insert(file_id.clone(), dataset);
        file_id
    }

    /// Store `dataset` under `file_id`, replacing any previous one
    pub fn insert(&self, file_id: FileId, dataset: Dataset) {
        tracing::debug!(file = %file_id, rows = dataset.row_count(), "dataset registered");
        self.datasets.insert(file_id, Arc::new(dataset));
    }

    /// Drop the dataset for `file_id`
    pub fn remove(&self, file_id: &FileId) -> Option<Arc<Dataset>> {
        self.datasets.remove(file_id).map(|(_, dataset)| dataset)
    }

    /// Registered datasets
    #[must_use]
    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

impl DatasetRegistry for InMemoryRegistry {
    fn get(&self, file_id: &FileId) -> Option<Arc<Dataset>> {
        self.datasets.get(file_id).map(|entry| Arc::clone(entry.value()))
    }
}
