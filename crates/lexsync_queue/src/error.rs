//! Error types for the durable queue.

use crate::record::SyncState;
use lexsync_storage::StorageError;
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur in queue operations.
///
/// Everything except [`QueueError::NotFound`] and
/// [`QueueError::InvalidTransition`] means the durability layer is broken
/// and the write it guarded did not happen.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The log contains bytes that are not a valid entry.
    #[error("queue log corrupted at offset {offset}: {message}")]
    Corrupted {
        /// Offset of the bad entry.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// An entry failed its checksum.
    #[error("checksum mismatch at offset {offset}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Offset of the bad entry.
        offset: u64,
        /// Checksum stored in the entry.
        expected: u32,
        /// Checksum computed over the entry.
        actual: u32,
    },

    /// A record payload does not fit in a log entry.
    #[error("record payload too large: {len} bytes")]
    PayloadTooLarge {
        /// Encoded payload length.
        len: usize,
    },

    /// No record with this key.
    #[error("record not found: {entity_class}/{id}")]
    NotFound {
        /// Entity class searched.
        entity_class: String,
        /// Record id searched.
        id: String,
    },

    /// The requested state change is not allowed from the current state.
    #[error("invalid transition for {entity_class}/{id}: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Entity class of the record.
        entity_class: String,
        /// Record id.
        id: String,
        /// Current state.
        from: SyncState,
        /// Requested state.
        to: SyncState,
    },

    /// The store was closed.
    #[error("queue store is closed")]
    Closed,
}

impl QueueError {
    pub(crate) fn not_found(entity_class: &str, id: &str) -> Self {
        Self::NotFound {
            entity_class: entity_class.to_string(),
            id: id.to_string(),
        }
    }

    /// Returns true if the error means the backing storage is unusable.
    #[must_use]
    pub fn is_storage_failure(&self) -> bool {
        !matches!(
            self,
            QueueError::NotFound { .. } | QueueError::InvalidTransition { .. }
        )
    }
}
