//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a storage backend.
///
/// Every variant means the durability layer cannot be trusted for the
/// current operation. Callers must surface these rather than drop a write.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// Another process holds the log file.
    #[error("storage locked: {path} is held by another process")]
    Locked {
        /// Path of the locked file.
        path: PathBuf,
    },

    /// The backing store refused the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The storage contents are corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),
}

impl StorageError {
    pub(crate) fn truncate_beyond_end(new_size: u64, size: u64) -> Self {
        Self::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("cannot truncate to size {new_size} which is greater than current size {size}"),
        ))
    }
}
