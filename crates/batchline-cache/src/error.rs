//! Error types for the cache.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by cache operations.
///
/// Reads never propagate these out of `get`; backend faults on the read
/// path are demoted to misses and counted. Writes surface them.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Disk IO failed.
    #[error("cache backend io error: {0}")]
    Io(#[from] std::io::Error),

    /// A blob on disk failed header or payload validation.
    #[error("corrupt cache blob at {path}: {reason}")]
    Corrupt {
        /// The offending file.
        path: PathBuf,
        /// What failed to validate.
        reason: String,
    },

    /// Two distinct keys sanitised to the same filename.
    #[error("cache key collision: `{stored}` vs `{requested}`")]
    KeyCollision {
        /// Key recorded inside the blob.
        stored: String,
        /// Key the caller asked for.
        requested: String,
    },

    /// The disk tier is disabled but a disk write was requested.
    #[error("disk tier is disabled")]
    DiskDisabled,

    /// The cache has not been started.
    #[error("cache is not running")]
    NotRunning,
}

impl CacheError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        CacheError::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
