use metrics::{Counter, Gauge};
use metrics_derive::Metrics;

/// The metrics for the [`super::UpkeepStateStore`].
#[derive(Metrics, Clone)]
#[metrics(scope = "upkeep_state")]
pub(crate) struct UpkeepStateMetrics {
    /// The number of records in the cache.
    pub cache_size: Gauge,
    /// The number of records flushed to the durable store.
    pub flushed_records: Counter,
    /// The number of failed batch inserts.
    pub flush_failures: Counter,
    /// The number of scanner lookups refused by the token buckets.
    pub throttled_scans: Counter,
}
