//! Status and pass reports exposed to the application.

use serde::Serialize;
use std::collections::BTreeMap;

/// Sync counters for one entity class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassStatus {
    /// `pending + in_progress + failed + completed`.
    pub total: usize,
    /// Records waiting for a pass.
    pub pending: usize,
    /// Records delivered since the orchestrator was created.
    pub completed: usize,
    /// Records whose last attempt failed, retryable or not.
    pub failed: usize,
    /// Records claimed by the running pass.
    pub in_progress: usize,
}

/// Snapshot returned by [`crate::SyncOrchestrator::get_status`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    /// Whether the device is online.
    pub online: bool,
    /// Whether a pass is running.
    pub syncing: bool,
    /// End of the last completed pass (ms since Unix epoch).
    pub last_sync: Option<u64>,
    /// Counters per entity class.
    pub classes: BTreeMap<String, ClassStatus>,
}

impl SyncStatus {
    /// Counters for one class, zero if the class is unknown.
    pub fn class(&self, entity_class: &str) -> ClassStatus {
        self.classes.get(entity_class).copied().unwrap_or_default()
    }

    /// Records waiting across all classes.
    pub fn pending(&self) -> usize {
        self.classes.values().map(|c| c.pending + c.in_progress).sum()
    }

    /// Records failed across all classes.
    pub fn failed(&self) -> usize {
        self.classes.values().map(|c| c.failed).sum()
    }
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Records acknowledged by their connector.
    pub synced: usize,
    /// Records that failed and will be retried.
    pub failed: usize,
    /// Records that failed permanently.
    pub failed_permanent: usize,
    /// True if the pass stopped because connectivity was lost.
    pub aborted: bool,
    /// True if the pass did not run because the device was offline.
    pub skipped: bool,
}

impl SyncReport {
    pub(crate) fn merge(&mut self, other: SyncReport) {
        self.synced += other.synced;
        self.failed += other.failed;
        self.failed_permanent += other.failed_permanent;
        self.aborted |= other.aborted;
    }

    /// Returns true if every attempted record was delivered.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.failed_permanent == 0 && !self.aborted
    }
}
