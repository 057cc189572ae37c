//! Error types for the knowledge base

use std::path::PathBuf;

/// Knowledge base and persistence errors
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    /// Reading or writing the backing file failed
    #[error("knowledge base I/O failed at {path}: {source}")]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Backing file exists but does not hold a valid entry map
    #[error("knowledge base file {path} is corrupt: {message}")]
    Corrupt {
        /// File being loaded
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Serializing entries failed
    #[error("failed to serialize knowledge base: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Store-specific failure (remote stores, test doubles)
    #[error("knowledge store unavailable: {0}")]
    Unavailable(String),
}

impl KnowledgeError {
    /// Build an I/O error for `path`
    #[inline]
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
