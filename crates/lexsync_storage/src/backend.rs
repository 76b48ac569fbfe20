//! Storage backend trait definition.

use crate::error::StorageResult;

/// An append-only byte store underneath a durable queue log.
///
/// # Invariants
///
/// - `append` returns the offset where the bytes begin
/// - `read_at` returns exactly the bytes previously written at that offset
/// - after `sync` returns, every appended byte survives process termination
/// - `replace` is all-or-nothing: a crash leaves either the old or the new
///   contents, never a mix
///
/// Backends must be `Send + Sync` so the queue can share them between the
/// foreground write path and the background sync loop.
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range extends past
    /// the current size, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Reads the whole store.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        let len = usize::try_from(size).map_err(|_| {
            crate::StorageError::Corrupted(format!("store of {size} bytes exceeds address space"))
        })?;
        self.read_at(0, len)
    }

    /// Appends data and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Makes data and metadata durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes, which is where the next append lands.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Cuts the store back to `new_size` bytes.
    ///
    /// Used to drop a torn tail found during recovery.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is larger than the current size or the
    /// truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Atomically replaces the entire contents with `data`.
    ///
    /// Used by compaction to swap in a rewritten log.
    ///
    /// # Errors
    ///
    /// Returns an error if the new contents cannot be made durable. On
    /// error the old contents remain in place.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;
}
