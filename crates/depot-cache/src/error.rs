use std::path::PathBuf;

use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

/// Errors produced by the blob cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Canonical "does not exist": the index record is absent, malformed,
    /// or names a different id. Callers fall through to the upstream.
    #[error("blob {id} missing: {reason}")]
    Missing { id: String, reason: String },

    /// The index record is valid but the data file length disagrees with it.
    #[error("blob {id} incomplete: index records {expected} bytes, data file has {actual}")]
    Incomplete {
        id: String,
        expected: u64,
        actual: u64,
    },

    /// The source bytes hashed to something other than the expected id
    /// while being copied into the cache.
    #[error("content changed while copying into cache")]
    ContentChanged,

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    /// True for errors the read path treats as a cache miss.
    ///
    /// `Incomplete` counts: a truncated data file should fall through to the
    /// upstream rather than fail the request, and will be repaired by the
    /// next successful put for the same id.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Missing { .. } | Self::Incomplete { .. })
    }
}
