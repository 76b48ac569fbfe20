//! CLI command implementations.

pub mod compact;
pub mod dump;
pub mod inspect;
pub mod verify;

use lexsync_queue::log::{self, LogScan, Replayed};
use lexsync_storage::{FileBackend, StorageBackend};
use std::path::Path;
use tracing::debug;

/// Reads and scans the log at `path` without modifying it.
pub(crate) fn read_log(path: &Path) -> Result<(u64, LogScan), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("Queue log not found at {:?}", path).into());
    }
    let backend = FileBackend::open(path)?;
    let bytes = backend.read_all()?;
    let scan = log::scan(&bytes);
    debug!(
        path = %path.display(),
        size = bytes.len(),
        entries = scan.entries.len(),
        valid_len = scan.valid_len,
        "scanned queue log"
    );
    Ok((bytes.len() as u64, scan))
}

/// Live records of the log at `path`.
pub(crate) fn load_records(path: &Path) -> Result<Replayed, Box<dyn std::error::Error>> {
    let (_, scan) = read_log(path)?;
    if let Some(log::LogIssue::Corrupted(err)) = scan.issue {
        return Err(format!("Queue log is corrupted: {err}").into());
    }
    Ok(log::replay(scan.entries.into_iter().map(|(_, entry)| entry)))
}
