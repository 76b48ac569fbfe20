//! # LexSync Storage
//!
//! Append-only byte stores that back the LexSync durable queue.
//!
//! Backends are **opaque**: they know nothing about queue records, framing
//! or checksums. The queue crate owns the log format and only asks a backend
//! to append bytes, read them back, make them durable and, during compaction,
//! atomically swap the whole contents for a rewritten log.
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - a single log file guarded by an advisory lock
//! - [`InMemoryBackend`] - shared in-memory buffer with fault injection, for tests
//!
//! ## Example
//!
//! ```rust
//! use lexsync_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"queued write").unwrap();
//! backend.sync().unwrap();
//! assert_eq!(backend.read_at(offset, 6).unwrap(), b"queued");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::{FaultSwitch, InMemoryBackend};
