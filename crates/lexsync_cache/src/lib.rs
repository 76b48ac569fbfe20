//! # LexSync Cache
//!
//! In-memory key/value cache with per-entry time-to-live.
//!
//! Entries are typed: a value is stored as whatever `T` it was set with and
//! read back by asking for the same `T`. Asking for a different type is a
//! miss. Expired entries are evicted lazily on read, or in bulk with
//! [`CacheLayer::clear_expired`].
//!
//! [`CacheLayer::get_or_set`] is a read-through helper: on a miss it runs
//! the supplied fetch and stores the result. Concurrent misses on one key
//! share a single fetch.
//!
//! ```rust
//! use lexsync_cache::CacheLayer;
//! use std::time::Duration;
//!
//! let cache = CacheLayer::new();
//! cache.set_with_ttl("cases", vec!["case-1".to_string()], Duration::from_secs(60));
//!
//! let cases: Option<Vec<String>> = cache.get("cases");
//! assert_eq!(cases.unwrap().len(), 1);
//! assert_eq!(cache.get::<u32>("cases"), None);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod layer;
mod stats;

pub use config::CacheConfig;
pub use layer::CacheLayer;
pub use stats::CacheStats;
