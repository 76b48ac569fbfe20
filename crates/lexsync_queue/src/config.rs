//! Queue configuration and retention policy.

use crate::record::{PendingRecord, SyncState};
use std::time::Duration;

/// Configuration for opening a [`crate::QueueStore`].
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Flush and sync the log after every mutation.
    ///
    /// Turning this off trades the crash guarantee of `save` for speed and
    /// is only meant for tests and throwaway queues.
    pub sync_on_write: bool,

    /// Cut an incomplete final entry off the log on open instead of failing.
    pub repair_torn_tail: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            repair_torn_tail: true,
        }
    }
}

impl QueueConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to sync after every mutation.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets whether a torn tail is repaired on open.
    #[must_use]
    pub const fn repair_torn_tail(mut self, value: bool) -> Self {
        self.repair_torn_tail = value;
        self
    }
}

/// What compaction does with records that reached `Synced`.
///
/// Records that are not `Synced` are never pruned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetentionPolicy {
    /// Keep synced records forever.
    #[default]
    KeepAll,
    /// Prune every synced record.
    PruneSynced,
    /// Prune synced records acknowledged longer ago than the given age.
    PruneSyncedOlderThan(Duration),
}

impl RetentionPolicy {
    /// Returns true if `record` should be pruned at time `now_ms`.
    #[must_use]
    pub fn should_prune(&self, record: &PendingRecord, now_ms: u64) -> bool {
        if record.sync_state != SyncState::Synced {
            return false;
        }
        match self {
            RetentionPolicy::KeepAll => false,
            RetentionPolicy::PruneSynced => true,
            RetentionPolicy::PruneSyncedOlderThan(age) => {
                let age_ms = u64::try_from(age.as_millis()).unwrap_or(u64::MAX);
                now_ms.saturating_sub(record.updated_at) >= age_ms
            }
        }
    }
}
