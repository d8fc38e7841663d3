use metrics::{Counter, Gauge};
use metrics_derive::Metrics;

/// The metrics for the [`super::BlockSubscriber`].
#[derive(Metrics, Clone)]
#[metrics(scope = "watcher")]
pub(crate) struct BlockSubscriberMetrics {
    /// A counter on the block hashes overwritten by a reorg.
    pub reorg_overwrites: Counter,
    /// A counter on the block histories sent to subscribers.
    pub histories_sent: Counter,
    /// The count of blocks held in the block map.
    pub tracked_blocks: Gauge,
}
