//! Configuration for the sync orchestrator.

use lexsync_batch::BatchConfig;
use lexsync_queue::{classes, RetentionPolicy};
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for a [`crate::SyncOrchestrator`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Upper bound on every connector call.
    pub connector_timeout: Duration,
    /// Retry budget and backoff for failed deliveries.
    pub retry: RetryConfig,
    /// Delay between regaining connectivity and the sync it triggers.
    pub reconnect_debounce: Duration,
    /// Interval for periodic background syncs, if any.
    pub sync_interval: Option<Duration>,
    /// Whether the background task syncs right after `start` when online.
    pub sync_on_start: bool,
    /// How long a remote listing stays cached.
    pub listing_ttl: Duration,
    /// Which `Synced` records `compact` removes.
    pub retention: RetentionPolicy,
    batch: HashMap<String, BatchConfig>,
    default_batch: BatchConfig,
}

impl SyncConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        let batch = HashMap::from([
            (classes::LAW_FIRM_CASES.to_string(), BatchConfig::law_firm_cases()),
            (
                classes::ACCOUNTING_ENTRIES.to_string(),
                BatchConfig::accounting_entries(),
            ),
            (classes::CALENDAR_EVENTS.to_string(), BatchConfig::calendar_events()),
        ]);

        Self {
            connector_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
            reconnect_debounce: Duration::from_millis(500),
            sync_interval: None,
            sync_on_start: true,
            listing_ttl: Duration::from_secs(5 * 60),
            retention: RetentionPolicy::KeepAll,
            batch,
            default_batch: BatchConfig::default(),
        }
    }

    /// Sets the connector timeout.
    pub fn with_connector_timeout(mut self, timeout: Duration) -> Self {
        self.connector_timeout = timeout;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the reconnect debounce.
    pub fn with_reconnect_debounce(mut self, debounce: Duration) -> Self {
        self.reconnect_debounce = debounce;
        self
    }

    /// Sets the interval for periodic background syncs.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Sets whether the background task syncs right after `start`.
    pub fn with_sync_on_start(mut self, enabled: bool) -> Self {
        self.sync_on_start = enabled;
        self
    }

    /// Sets the lifetime of cached remote listings.
    pub fn with_listing_ttl(mut self, ttl: Duration) -> Self {
        self.listing_ttl = ttl;
        self
    }

    /// Sets the retention policy used by `compact`.
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Sets the batch thresholds for one entity class.
    pub fn with_batch_config(mut self, entity_class: impl Into<String>, batch: BatchConfig) -> Self {
        self.batch.insert(entity_class.into(), batch);
        self
    }

    /// Sets the batch thresholds for classes without their own.
    pub fn with_default_batch_config(mut self, batch: BatchConfig) -> Self {
        self.default_batch = batch;
        self
    }

    /// Returns the batch thresholds for an entity class.
    pub fn batch_config_for(&self, entity_class: &str) -> BatchConfig {
        self.batch
            .get(entity_class)
            .copied()
            .unwrap_or(self.default_batch)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Retry budget and backoff between sync passes.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Failed attempts after which a record fails permanently.
    pub max_attempts: u32,
    /// Delay before the first background retry.
    pub initial_delay: Duration,
    /// Maximum delay between background retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Creates a retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }

    /// One attempt, no background retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Delay before background retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}
