use metrics::{Counter, Histogram};
use metrics_derive::Metrics;

/// The metrics for the [`super::OnchainKeyring`].
#[derive(Metrics, Clone)]
#[metrics(scope = "signer")]
pub struct KeyringMetrics {
    /// The report signing duration.
    pub signing_duration: Histogram,
    /// The number of reports which failed to be signed.
    pub signing_failures: Counter,
}
