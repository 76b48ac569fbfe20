//! # LexSync Batch
//!
//! Accumulates individual operations and hands them to an async batch
//! handler in chunks.
//!
//! A chunk is flushed when `batch_size` operations are buffered or when
//! `flush_timeout` has passed since the oldest buffered operation arrived.
//! Each operation gets its own result: when the handler fails for one
//! chunk, only that chunk's operations are rejected.
//!
//! ## Design
//!
//! The buffer belongs to a single flush task. [`BatchProcessor::add`] and
//! [`BatchProcessor::flush`] only send messages to it, so size-triggered,
//! timer-triggered and explicit flushes can never run concurrently on the
//! same processor.
//!
//! ```rust
//! use lexsync_batch::{BatchConfig, BatchProcessor};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let processor = BatchProcessor::new(
//!     BatchConfig::new(2, Duration::from_millis(50)),
//!     |items: Vec<u32>| async move { Ok::<_, String>(items.iter().map(|n| n * 10).collect()) },
//! );
//!
//! let first = processor.add(1);
//! let second = processor.add(2);
//! assert_eq!(first.await.unwrap(), 10);
//! assert_eq!(second.await.unwrap(), 20);
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod processor;

pub use config::BatchConfig;
pub use error::{BatchError, BatchResult};
pub use processor::BatchProcessor;
