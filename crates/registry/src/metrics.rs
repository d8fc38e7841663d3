use metrics::{Counter, Gauge};
use metrics_derive::Metrics;

/// The metrics for the [`super::EvmRegistry`].
#[derive(Metrics, Clone)]
#[metrics(scope = "registry")]
pub(crate) struct RegistryMetrics {
    /// The number of active upkeeps after the last refresh.
    pub active_upkeeps: Gauge,
    /// The number of payloads checked.
    pub checks: Counter,
    /// The number of eligible check results.
    pub eligible_results: Counter,
    /// The number of check results failed in the pipeline.
    pub pipeline_failures: Counter,
    /// The number of lifecycle logs processed.
    pub processed_logs: Counter,
    /// The number of failed refresh cycles.
    pub refresh_failures: Counter,
}
