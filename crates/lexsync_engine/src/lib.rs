//! # LexSync Engine
//!
//! Offline-first delivery of law-firm cases, accounting entries, calendar
//! events and documents to their external systems.
//!
//! This crate provides:
//! - [`Connector`], the seam to each external system
//! - [`SyncOrchestrator`], which creates remotely when it can and queues
//!   durably when it cannot
//! - sync passes that replay the queue in FIFO order per entity class,
//!   singly or through a batch processor
//! - a background task that syncs on reconnect (debounced), on an interval
//!   and with backoff after failures
//! - a read-through cache for remote listings
//!
//! ## Delivery guarantees
//!
//! - A write accepted by [`SyncOrchestrator::create_with_fallback`] is
//!   either created remotely or durably queued before the call returns
//! - Queued records are delivered at least once; a record is only marked
//!   `Synced` after its connector acknowledged it
//! - A failed chunk of a batch only fails the records in that chunk
//! - Records rejected as invalid stay queued, out of replay, until
//!   [`SyncOrchestrator::retry_failed`]
//!
//! ```rust,no_run
//! use lexsync_engine::{classes, MockConnector, SyncConfig, SyncOrchestrator};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn run() -> lexsync_engine::EngineResult<()> {
//! let orchestrator = SyncOrchestrator::open_path(Path::new("queue.log"), SyncConfig::default())?;
//! orchestrator.register_connector(classes::LAW_FIRM_CASES, Arc::new(MockConnector::new()));
//! orchestrator.start()?;
//!
//! let outcome = orchestrator
//!     .create_with_fallback(classes::LAW_FIRM_CASES, serde_json::json!({"title": "Doe v. Roe"}))
//!     .await?;
//! println!("created {} (queued: {})", outcome.id, outcome.offline);
//!
//! orchestrator.close().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connectivity;
mod connector;
mod error;
mod orchestrator;
mod status;

pub use config::{RetryConfig, SyncConfig};
pub use connectivity::Connectivity;
pub use connector::{Connector, MockConnector};
pub use error::{ConnectorError, ConnectorResult, EngineError, EngineResult};
pub use orchestrator::{CreateOutcome, SyncOrchestrator, OFFLINE_ID_PREFIX};
pub use status::{ClassStatus, SyncReport, SyncStatus};

pub use lexsync_queue::{classes, RetentionPolicy};
