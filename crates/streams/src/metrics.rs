use metrics::{Counter, Histogram};
use metrics_derive::Metrics;

/// The metrics for the [`super::Streams`] lookups.
#[derive(Metrics, Clone)]
#[metrics(scope = "streams")]
pub(crate) struct StreamsMetrics {
    /// The number of lookups attempted.
    pub lookups: Counter,
    /// The number of requests to the data provider.
    pub requests: Counter,
    /// The number of requests which were retried.
    pub retried_requests: Counter,
    /// The number of allow-list answers served from the cache.
    pub allow_list_cache_hits: Counter,
    /// The number of lookups handed to the upkeep's error handler.
    pub error_handler_calls: Counter,
    /// The duration of a full report fetch.
    pub fetch_duration: Histogram,
}
