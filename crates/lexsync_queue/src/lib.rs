//! # LexSync Queue
//!
//! Crash-durable store for writes that could not reach their remote system.
//!
//! When a law-firm case, accounting entry, calendar event or document
//! cannot be created remotely, the write lands here as a
//! [`PendingRecord`] and waits for a sync pass. Losing such a record is the
//! one outcome the engine must never produce, so:
//!
//! - [`QueueStore::save`] returns only after the record is synced to disk
//! - storage failures are returned, never swallowed
//! - records only leave the store through explicit pruning after `Synced`
//!
//! ## Record lifecycle
//!
//! `Pending -> Syncing -> Synced | Failed`, `Failed -> Pending` on retry,
//! `Syncing -> Pending` when a pass is interrupted. See [`SyncState`].
//!
//! ## Storage
//!
//! The store keeps an in-memory index rebuilt from an append-only log of
//! checksummed entries (see [`log`]) on top of any
//! [`lexsync_storage::StorageBackend`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
pub mod log;
mod record;
mod store;

pub use config::{QueueConfig, RetentionPolicy};
pub use error::{QueueError, QueueResult};
pub use record::{classes, now_millis, PendingRecord, StateCounts, SyncState};
pub use store::{CompactionStats, QueueStore};
