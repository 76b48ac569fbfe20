//! Batch processor configuration.

use std::time::Duration;

/// Flush thresholds for a [`crate::BatchProcessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum operations per handler call; reaching it triggers a flush.
    pub batch_size: usize,
    /// Maximum time the oldest buffered operation waits.
    pub flush_timeout: Duration,
}

impl BatchConfig {
    /// Creates a configuration. A `batch_size` of zero is treated as one.
    #[must_use]
    pub fn new(batch_size: usize, flush_timeout: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            flush_timeout,
        }
    }

    /// Thresholds used for law-firm cases.
    #[must_use]
    pub fn law_firm_cases() -> Self {
        Self::new(10, Duration::from_millis(1000))
    }

    /// Thresholds used for accounting entries.
    #[must_use]
    pub fn accounting_entries() -> Self {
        Self::new(20, Duration::from_millis(2000))
    }

    /// Thresholds used for calendar events.
    #[must_use]
    pub fn calendar_events() -> Self {
        Self::new(15, Duration::from_millis(1500))
    }

    /// Sets the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sets the flush timeout.
    #[must_use]
    pub fn with_flush_timeout(mut self, flush_timeout: Duration) -> Self {
        self.flush_timeout = flush_timeout;
        self
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::law_firm_cases()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_batch_size_is_clamped() {
        assert_eq!(BatchConfig::new(0, Duration::ZERO).batch_size, 1);
        assert_eq!(BatchConfig::default().with_batch_size(0).batch_size, 1);
    }

    #[test]
    fn per_class_presets() {
        assert_eq!(BatchConfig::accounting_entries().batch_size, 20);
        assert_eq!(
            BatchConfig::calendar_events().flush_timeout,
            Duration::from_millis(1500)
        );
    }
}
