use metrics::{Counter, Gauge};
use metrics_derive::Metrics;

/// The metrics for the [`super::LogEventProvider`].
#[derive(Metrics, Clone)]
#[metrics(scope = "log_provider")]
pub(crate) struct LogProviderMetrics {
    /// The number of logs returned to the callers.
    pub logs_fetched: Counter,
    /// The number of polls skipped on the block range limit.
    pub block_limit_skips: Counter,
    /// The number of polls cut short or skipped on the log count limit.
    pub log_limit_skips: Counter,
    /// The number of registered filters.
    pub filters: Gauge,
}

/// The metrics for the [`super::LogRecoverer`].
#[derive(Metrics, Clone)]
#[metrics(scope = "log_recoverer")]
pub(crate) struct LogRecovererMetrics {
    /// The number of payloads waiting to be proposed.
    pub pending: Gauge,
    /// The number of missed logs added to the pending payloads.
    pub recovered: Counter,
    /// The number of visited logs dropped once out of the recovery window.
    pub expired: Counter,
    /// The number of filters whose recovery failed.
    pub filter_failures: Counter,
}
