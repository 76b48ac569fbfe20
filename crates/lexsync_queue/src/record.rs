//! Queued record types and the per-record state machine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Well-known entity class names.
pub mod classes {
    /// Cases in the law-firm management system.
    pub const LAW_FIRM_CASES: &str = "lawFirmCases";
    /// Entries in the accounting system.
    pub const ACCOUNTING_ENTRIES: &str = "accountingEntries";
    /// Events in the calendar system.
    pub const CALENDAR_EVENTS: &str = "calendarEvents";
    /// Uploaded documents.
    pub const DOCUMENTS: &str = "documents";

    /// All well-known classes.
    pub const ALL: [&str; 4] = [LAW_FIRM_CASES, ACCOUNTING_ENTRIES, CALENDAR_EVENTS, DOCUMENTS];
}

/// Synchronization state of a queued record.
///
/// ```text
/// Pending --claim--> Syncing --ack--> Synced
///    ^                  |  |
///    |                  |  +--error--> Failed
///    +---abort/crash----+                 |
///    +-------------retry------------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncState {
    /// Waiting for a sync pass.
    Pending,
    /// Claimed by a sync pass, remote call in flight.
    Syncing,
    /// Acknowledged by the remote system.
    Synced,
    /// Last attempt failed.
    Failed,
}

impl SyncState {
    /// Returns true if `self -> next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: SyncState) -> bool {
        matches!(
            (self, next),
            (SyncState::Pending, SyncState::Syncing)
                | (SyncState::Syncing, SyncState::Synced)
                | (SyncState::Syncing, SyncState::Failed)
                | (SyncState::Syncing, SyncState::Pending)
                | (SyncState::Failed, SyncState::Pending)
        )
    }

    /// Lowercase name used in listings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Syncing => "syncing",
            SyncState::Synced => "synced",
            SyncState::Failed => "failed",
        }
    }
}

/// A write waiting to reach its remote system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRecord {
    /// Record id, unique within its entity class.
    pub id: String,
    /// Entity class the record belongs to.
    pub entity_class: String,
    /// The payload to deliver.
    pub payload: Value,
    /// When the record was saved (ms since Unix epoch).
    pub created_at: u64,
    /// When the record last changed (ms since Unix epoch).
    pub updated_at: u64,
    /// Current state.
    pub sync_state: SyncState,
    /// Number of failed delivery attempts.
    pub attempts: u32,
    /// Error from the most recent failed attempt.
    pub last_error: Option<String>,
    /// False once the record failed permanently.
    pub retryable: bool,
    /// Log sequence assigned at save; breaks `created_at` ties.
    pub sequence: u64,
}

impl PendingRecord {
    pub(crate) fn new(entity_class: &str, id: &str, payload: Value, sequence: u64) -> Self {
        let now = now_millis();
        Self {
            id: id.to_string(),
            entity_class: entity_class.to_string(),
            payload,
            created_at: now,
            updated_at: now,
            sync_state: SyncState::Pending,
            attempts: 0,
            last_error: None,
            retryable: true,
            sequence,
        }
    }

    /// Returns true if a sync pass should pick this record up.
    #[must_use]
    pub fn awaits_sync(&self) -> bool {
        match self.sync_state {
            SyncState::Synced => false,
            SyncState::Failed => self.retryable,
            SyncState::Pending | SyncState::Syncing => true,
        }
    }

    /// FIFO ordering key.
    #[must_use]
    pub fn fifo_key(&self) -> (u64, u64) {
        (self.created_at, self.sequence)
    }
}

/// Number of records per state within one entity class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    /// Records in `Pending`.
    pub pending: usize,
    /// Records in `Syncing`.
    pub syncing: usize,
    /// Records in `Synced`.
    pub synced: usize,
    /// Records in `Failed` that will be retried.
    pub failed: usize,
    /// Records in `Failed` that need an explicit retry.
    pub failed_permanent: usize,
}

impl StateCounts {
    /// Counts one record.
    pub fn add(&mut self, record: &PendingRecord) {
        match record.sync_state {
            SyncState::Pending => self.pending += 1,
            SyncState::Syncing => self.syncing += 1,
            SyncState::Synced => self.synced += 1,
            SyncState::Failed if record.retryable => self.failed += 1,
            SyncState::Failed => self.failed_permanent += 1,
        }
    }

    /// Total records counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.syncing + self.synced + self.failed + self.failed_permanent
    }
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legal_transitions() {
        use SyncState::*;
        assert!(Pending.can_transition_to(Syncing));
        assert!(Syncing.can_transition_to(Synced));
        assert!(Syncing.can_transition_to(Failed));
        assert!(Syncing.can_transition_to(Pending));
        assert!(Failed.can_transition_to(Pending));

        assert!(!Pending.can_transition_to(Synced));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Synced.can_transition_to(Pending));
        assert!(!Synced.can_transition_to(Syncing));
        assert!(!Failed.can_transition_to(Syncing));
    }

    #[test]
    fn awaits_sync_excludes_synced_and_permanent_failures() {
        let mut record = PendingRecord::new("documents", "d1", json!({"name": "lease.pdf"}), 1);
        assert!(record.awaits_sync());

        record.sync_state = SyncState::Failed;
        assert!(record.awaits_sync());

        record.retryable = false;
        assert!(!record.awaits_sync());

        record.sync_state = SyncState::Synced;
        assert!(!record.awaits_sync());
    }

    #[test]
    fn counts_split_failures() {
        let mut counts = StateCounts::default();
        let mut record = PendingRecord::new("documents", "d1", Value::Null, 1);
        counts.add(&record);
        record.sync_state = SyncState::Failed;
        counts.add(&record);
        record.retryable = false;
        counts.add(&record);

        assert_eq!(counts.pending, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.failed_permanent, 1);
        assert_eq!(counts.total(), 3);
    }
}
