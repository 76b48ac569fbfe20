//! Cache configuration.

use std::time::Duration;

/// Configuration for a [`crate::CacheLayer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL applied by [`crate::CacheLayer::set`].
    pub default_ttl: Duration,
}

impl CacheConfig {
    /// Five minutes, the lifetime of a cached remote listing.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_ttl: Self::DEFAULT_TTL,
        }
    }

    /// Sets the default TTL.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new()
    }
}
