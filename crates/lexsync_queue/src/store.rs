//! The durable queue store.

use crate::config::{QueueConfig, RetentionPolicy};
use crate::error::{QueueError, QueueResult};
use crate::log::{self, LogEntry, LogIssue, RecordKey};
use crate::record::{now_millis, PendingRecord, StateCounts, SyncState};
use lexsync_storage::{FileBackend, InMemoryBackend, StorageBackend};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

/// Outcome of a compaction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Records written to the new log.
    pub records_kept: usize,
    /// Synced records dropped by the retention policy.
    pub records_pruned: usize,
    /// Log size before compaction.
    pub bytes_before: u64,
    /// Log size after compaction.
    pub bytes_after: u64,
}

/// A crash-durable store of writes that have not reached their remote
/// system yet, keyed by `(entity_class, id)`.
///
/// Every mutation is appended to the log and, with the default
/// configuration, synced before the call returns. The index and the log are
/// guarded by one lock, so each mutation is an atomic read-modify-write:
/// the foreground write path and a background sync pass cannot interleave
/// on the same record.
///
/// # Example
///
/// ```rust
/// use lexsync_queue::{QueueStore, SyncState};
/// use serde_json::json;
///
/// let store = QueueStore::in_memory().unwrap();
/// store.save("lawFirmCases", "offline_1", json!({"title": "X"})).unwrap();
///
/// let claimed = store.mark_syncing("lawFirmCases", "offline_1").unwrap();
/// assert_eq!(claimed.sync_state, SyncState::Syncing);
/// store.mark_synced("lawFirmCases", "offline_1").unwrap();
/// assert!(store.list_unsynced("lawFirmCases").unwrap().is_empty());
/// ```
pub struct QueueStore {
    config: QueueConfig,
    inner: Mutex<Inner>,
}

struct Inner {
    backend: Box<dyn StorageBackend>,
    records: BTreeMap<String, HashMap<String, PendingRecord>>,
    next_sequence: u64,
    closed: bool,
}

impl QueueStore {
    /// Opens a store over `backend`, replaying its log.
    ///
    /// An incomplete final entry is cut off when
    /// [`QueueConfig::repair_torn_tail`] is set. Records left in `Syncing`
    /// by a crash are moved back to `Pending`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read, is corrupted before its
    /// final entry, or the recovery writes fail.
    pub fn open(mut backend: Box<dyn StorageBackend>, config: QueueConfig) -> QueueResult<Self> {
        let bytes = backend.read_all()?;
        let scan = log::scan(&bytes);

        match scan.issue {
            Some(LogIssue::Corrupted(err)) => return Err(err),
            Some(LogIssue::TornTail { offset }) => {
                if !config.repair_torn_tail {
                    return Err(QueueError::Corrupted {
                        offset,
                        message: "incomplete final entry".into(),
                    });
                }
                warn!(
                    offset,
                    dropped = bytes.len() as u64 - offset,
                    "dropping torn tail of queue log"
                );
                backend.truncate(offset)?;
            }
            None => {}
        }

        let replayed = log::replay(scan.entries.into_iter().map(|(_, entry)| entry));

        let mut inner = Inner {
            backend,
            records: replayed.records,
            next_sequence: replayed.next_sequence,
            closed: false,
        };

        let interrupted: Vec<(String, String)> = inner
            .records
            .values()
            .flat_map(|class| class.values())
            .filter(|r| r.sync_state == SyncState::Syncing)
            .map(|r| (r.entity_class.clone(), r.id.clone()))
            .collect();
        for (entity_class, id) in &interrupted {
            inner.transition(entity_class, id, SyncState::Pending, config.sync_on_write, |_| {})?;
        }
        if !interrupted.is_empty() {
            info!(count = interrupted.len(), "requeued records interrupted mid-sync");
        }

        info!(
            records = inner.records.values().map(HashMap::len).sum::<usize>(),
            classes = inner.records.len(),
            "queue store opened"
        );

        Ok(Self {
            config,
            inner: Mutex::new(inner),
        })
    }

    /// Opens a file-backed store, creating the file and its directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is locked by another process or cannot
    /// be opened, or if [`QueueStore::open`] fails.
    pub fn open_path(path: &Path, config: QueueConfig) -> QueueResult<Self> {
        let backend = FileBackend::open_with_create_dirs(path)?;
        Self::open(Box::new(backend), config)
    }

    /// Opens an empty store held in memory.
    ///
    /// # Errors
    ///
    /// Never fails in practice; kept fallible for symmetry with `open`.
    pub fn in_memory() -> QueueResult<Self> {
        Self::open(Box::new(InMemoryBackend::new()), QueueConfig::default())
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Inserts or replaces a record as `Pending` and makes it durable.
    ///
    /// A replaced record starts over: fresh `created_at`, zero attempts, no
    /// error. If a sync pass holds the old version, its later
    /// `mark_synced` fails with [`QueueError::InvalidTransition`] and the new
    /// payload stays queued.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be made durable. The record is
    /// not queued in that case.
    pub fn save(&self, entity_class: &str, id: &str, payload: Value) -> QueueResult<PendingRecord> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;

        let sequence = inner.next_sequence;
        let record = PendingRecord::new(entity_class, id, payload, sequence);
        let record = inner.commit(record, self.config.sync_on_write)?;
        inner.next_sequence += 1;

        debug!(entity_class, id, sequence, "record queued");
        Ok(record)
    }

    /// Returns the record stored under `(entity_class, id)`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] after `close`.
    pub fn get(&self, entity_class: &str, id: &str) -> QueueResult<Option<PendingRecord>> {
        let inner = self.inner.lock();
        inner.ensure_open()?;
        Ok(inner
            .records
            .get(entity_class)
            .and_then(|class| class.get(id))
            .cloned())
    }

    /// Returns every record a sync pass should deliver, oldest first.
    ///
    /// That is every record not `Synced`, except permanent failures.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] after `close`.
    pub fn list_unsynced(&self, entity_class: &str) -> QueueResult<Vec<PendingRecord>> {
        self.list_where(entity_class, PendingRecord::awaits_sync)
    }

    /// Returns every `Failed` record, retryable or not, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] after `close`.
    pub fn list_failed(&self, entity_class: &str) -> QueueResult<Vec<PendingRecord>> {
        self.list_where(entity_class, |r| r.sync_state == SyncState::Failed)
    }

    /// Returns every record of a class in the given state, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] after `close`.
    pub fn list_by_state(
        &self,
        entity_class: &str,
        state: SyncState,
    ) -> QueueResult<Vec<PendingRecord>> {
        self.list_where(entity_class, |r| r.sync_state == state)
    }

    fn list_where(
        &self,
        entity_class: &str,
        predicate: impl Fn(&PendingRecord) -> bool,
    ) -> QueueResult<Vec<PendingRecord>> {
        let inner = self.inner.lock();
        inner.ensure_open()?;
        let mut records: Vec<PendingRecord> = inner
            .records
            .get(entity_class)
            .map(|class| class.values().filter(|r| predicate(r)).cloned().collect())
            .unwrap_or_default();
        records.sort_by_key(PendingRecord::fifo_key);
        Ok(records)
    }

    /// Claims a `Pending` record for delivery (`Pending -> Syncing`).
    ///
    /// Claiming is a check-and-set, so one record cannot be claimed by two
    /// passes at once.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidTransition`] if the record is not
    /// `Pending`, [`QueueError::NotFound`] if it does not exist, or a
    /// storage error.
    pub fn mark_syncing(&self, entity_class: &str, id: &str) -> QueueResult<PendingRecord> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        inner.transition(entity_class, id, SyncState::Syncing, self.config.sync_on_write, |_| {})
    }

    /// Records a remote acknowledgment (`Syncing -> Synced`).
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidTransition`] if the record is not
    /// `Syncing` (for example because it was saved again mid-pass).
    pub fn mark_synced(&self, entity_class: &str, id: &str) -> QueueResult<PendingRecord> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        let record = inner.transition(
            entity_class,
            id,
            SyncState::Synced,
            self.config.sync_on_write,
            |r| r.last_error = None,
        )?;
        debug!(entity_class, id, "record synced");
        Ok(record)
    }

    /// Records a transient failure (`Syncing -> Failed`).
    ///
    /// Increments `attempts` and stores `error`. The record stays queued and
    /// is picked up by the next pass.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidTransition`] if the record is not
    /// `Syncing`.
    pub fn mark_failed(
        &self,
        entity_class: &str,
        id: &str,
        error: impl Into<String>,
    ) -> QueueResult<PendingRecord> {
        self.fail(entity_class, id, error.into(), true)
    }

    /// Records a permanent failure (`Syncing -> Failed`, not retryable).
    ///
    /// The record is kept but excluded from [`QueueStore::list_unsynced`]
    /// until [`QueueStore::requeue_failed`] resets it.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidTransition`] if the record is not
    /// `Syncing`.
    pub fn mark_failed_permanent(
        &self,
        entity_class: &str,
        id: &str,
        error: impl Into<String>,
    ) -> QueueResult<PendingRecord> {
        self.fail(entity_class, id, error.into(), false)
    }

    fn fail(
        &self,
        entity_class: &str,
        id: &str,
        error: String,
        retryable: bool,
    ) -> QueueResult<PendingRecord> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        let record = inner.transition(
            entity_class,
            id,
            SyncState::Failed,
            self.config.sync_on_write,
            |r| {
                r.attempts += 1;
                r.last_error = Some(error);
                r.retryable = retryable;
            },
        )?;
        debug!(entity_class, id, attempts = record.attempts, retryable, "record failed");
        Ok(record)
    }

    /// Puts a `Failed` or `Syncing` record back to `Pending`.
    ///
    /// Attempts are kept, so the retry budget keeps counting down.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidTransition`] from any other state.
    pub fn requeue(&self, entity_class: &str, id: &str) -> QueueResult<PendingRecord> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        inner.transition(entity_class, id, SyncState::Pending, self.config.sync_on_write, |_| {})
    }

    /// Resets every `Failed` record of a class to `Pending` with a fresh
    /// retry budget, including permanent failures.
    ///
    /// Returns how many records were reset.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a reset cannot be persisted; records
    /// reset before the error stay reset.
    pub fn requeue_failed(&self, entity_class: &str) -> QueueResult<usize> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        let failed: Vec<String> = inner
            .records
            .get(entity_class)
            .map(|class| {
                class
                    .values()
                    .filter(|r| r.sync_state == SyncState::Failed)
                    .map(|r| r.id.clone())
                    .collect()
            })
            .unwrap_or_default();

        for id in &failed {
            inner.transition(entity_class, id, SyncState::Pending, self.config.sync_on_write, |r| {
                r.attempts = 0;
                r.retryable = true;
            })?;
        }
        if !failed.is_empty() {
            info!(entity_class, count = failed.len(), "failed records requeued");
        }
        Ok(failed.len())
    }

    /// Removes one `Synced` record.
    ///
    /// Returns `false` and leaves the record alone if it is not `Synced`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] or a storage error.
    pub fn prune(&self, entity_class: &str, id: &str) -> QueueResult<bool> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        if inner.record(entity_class, id)?.sync_state != SyncState::Synced {
            return Ok(false);
        }

        let entry = LogEntry::Remove(RecordKey {
            entity_class: entity_class.to_string(),
            id: id.to_string(),
        });
        inner.append(&entry, self.config.sync_on_write)?;
        if let Some(class) = inner.records.get_mut(entity_class) {
            class.remove(id);
        }
        Ok(true)
    }

    /// Rewrites the log with only the live records, pruning `Synced`
    /// records the policy selects.
    ///
    /// The rewrite replaces the log atomically, so a crash during compaction
    /// leaves either the old log or the new one.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error; the old log stays in place.
    pub fn compact(&self, policy: RetentionPolicy) -> QueueResult<CompactionStats> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        let now = now_millis();
        let bytes_before = inner.backend.size()?;

        let mut kept: Vec<&PendingRecord> = Vec::new();
        let mut pruned: Vec<RecordKey> = Vec::new();
        for record in inner.records.values().flat_map(HashMap::values) {
            if policy.should_prune(record, now) {
                pruned.push(RecordKey {
                    entity_class: record.entity_class.clone(),
                    id: record.id.clone(),
                });
            } else {
                kept.push(record);
            }
        }
        kept.sort_by_key(|r| r.sequence);

        let mut bytes = Vec::new();
        for record in &kept {
            bytes.extend_from_slice(&LogEntry::Put((*record).clone()).encode()?);
        }
        let records_kept = kept.len();

        inner.backend.replace(&bytes)?;
        for key in &pruned {
            if let Some(class) = inner.records.get_mut(&key.entity_class) {
                class.remove(&key.id);
            }
        }
        inner.records.retain(|_, class| !class.is_empty());

        let stats = CompactionStats {
            records_kept,
            records_pruned: pruned.len(),
            bytes_before,
            bytes_after: bytes.len() as u64,
        };
        info!(
            kept = stats.records_kept,
            pruned = stats.records_pruned,
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            "queue log compacted"
        );
        Ok(stats)
    }

    /// Returns every entity class that has at least one record.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] after `close`.
    pub fn entity_classes(&self) -> QueueResult<Vec<String>> {
        let inner = self.inner.lock();
        inner.ensure_open()?;
        Ok(inner
            .records
            .iter()
            .filter(|(_, class)| !class.is_empty())
            .map(|(name, _)| name.clone())
            .collect())
    }

    /// Counts the records of a class by state.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] after `close`.
    pub fn counts(&self, entity_class: &str) -> QueueResult<StateCounts> {
        let inner = self.inner.lock();
        inner.ensure_open()?;
        let mut counts = StateCounts::default();
        if let Some(class) = inner.records.get(entity_class) {
            class.values().for_each(|r| counts.add(r));
        }
        Ok(counts)
    }

    /// Total number of records across all classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().records.values().map(HashMap::len).sum()
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current log size in bytes.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the size cannot be read.
    pub fn log_size(&self) -> QueueResult<u64> {
        Ok(self.inner.lock().backend.size()?)
    }

    /// Syncs the log and rejects further operations.
    ///
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the final sync fails.
    pub fn close(&self) -> QueueResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Ok(());
        }
        inner.backend.flush()?;
        inner.backend.sync()?;
        inner.closed = true;
        info!("queue store closed");
        Ok(())
    }

    /// Returns true once `close` has succeeded.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl Inner {
    fn ensure_open(&self) -> QueueResult<()> {
        if self.closed {
            Err(QueueError::Closed)
        } else {
            Ok(())
        }
    }

    fn record(&self, entity_class: &str, id: &str) -> QueueResult<&PendingRecord> {
        self.records
            .get(entity_class)
            .and_then(|class| class.get(id))
            .ok_or_else(|| QueueError::not_found(entity_class, id))
    }

    /// Appends one entry; on failure the log is cut back so a partial frame
    /// never sits in front of later appends.
    fn append(&mut self, entry: &LogEntry, sync: bool) -> QueueResult<()> {
        let frame = entry.encode()?;
        let before = self.backend.size()?;

        let written = self.backend.append(&frame).and_then(|_| {
            if sync {
                self.backend.flush()?;
                self.backend.sync()?;
            }
            Ok(())
        });

        if let Err(err) = written {
            if let Err(rollback) = self.backend.truncate(before) {
                warn!(error = %rollback, offset = before, "could not roll back failed append");
            }
            return Err(err.into());
        }
        Ok(())
    }

    fn commit(&mut self, record: PendingRecord, sync: bool) -> QueueResult<PendingRecord> {
        self.append(&LogEntry::Put(record.clone()), sync)?;
        self.records
            .entry(record.entity_class.clone())
            .or_default()
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn transition(
        &mut self,
        entity_class: &str,
        id: &str,
        to: SyncState,
        sync: bool,
        mutate: impl FnOnce(&mut PendingRecord),
    ) -> QueueResult<PendingRecord> {
        let current = self.record(entity_class, id)?;
        if !current.sync_state.can_transition_to(to) {
            return Err(QueueError::InvalidTransition {
                entity_class: entity_class.to_string(),
                id: id.to_string(),
                from: current.sync_state,
                to,
            });
        }

        let mut next = current.clone();
        next.sync_state = to;
        next.updated_at = now_millis();
        mutate(&mut next);
        self.commit(next, sync)
    }
}
