//! Injectable counter metrics
//!
//! The shipper reports coarse operational counters through a [`MetricsSink`]
//! supplied at construction time; nothing here is process-global. The default
//! sink discards everything.

use dashmap::DashMap;

/// Counter: sync passes started
pub const SYNCS_TOTAL: &str = "blockship_syncs_total";
/// Counter: sync passes that ended in a fatal scan failure
pub const SYNC_FAILURES_TOTAL: &str = "blockship_sync_failures_total";
/// Counter: block upload attempts
pub const UPLOADS_TOTAL: &str = "blockship_uploads_total";
/// Counter: failed block upload attempts
pub const UPLOAD_FAILURES_TOTAL: &str = "blockship_upload_failures_total";

/// Sink for monotonic counters emitted by the shipper
pub trait MetricsSink: Send + Sync {
    /// Increment the named counter by one
    fn increment_counter(&self, name: &str);
}

/// Sink that discards all metrics; the default
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetrics;

impl MetricsSink for NullMetrics {
    fn increment_counter(&self, _name: &str) {}
}

/// Thread-safe in-memory counter sink
///
/// Suitable for tests and for adapters that periodically scrape values into
/// an external metrics system.
#[derive(Debug, Default)]
pub struct CounterMetrics {
    counters: DashMap<String, u64>,
}

impl CounterMetrics {
    /// Create a sink with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter; zero if never incremented
    pub fn value(&self, name: &str) -> u64 {
        self.counters.get(name).map(|v| *v).unwrap_or(0)
    }
}

impl MetricsSink for CounterMetrics {
    fn increment_counter(&self, name: &str) {
        *self.counters.entry(name.to_string()).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_metrics_increment() {
        let metrics = CounterMetrics::new();
        assert_eq!(metrics.value(UPLOADS_TOTAL), 0);

        metrics.increment_counter(UPLOADS_TOTAL);
        metrics.increment_counter(UPLOADS_TOTAL);
        metrics.increment_counter(SYNCS_TOTAL);

        assert_eq!(metrics.value(UPLOADS_TOTAL), 2);
        assert_eq!(metrics.value(SYNCS_TOTAL), 1);
        assert_eq!(metrics.value(UPLOAD_FAILURES_TOTAL), 0);
    }

    #[test]
    fn test_null_metrics_is_silent() {
        NullMetrics.increment_counter(SYNCS_TOTAL);
    }
}
