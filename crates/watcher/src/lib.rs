//! Block subscriber for the automation node.
//!
//! The [`BlockSubscriber`] follows the chain heads, keeps a bounded map of recent block hashes
//! and fans a [`BlockHistory`] out to every subscriber on each new head.

mod error;
pub use error::BlockSubscriberError;

mod metrics;
use metrics::BlockSubscriberMetrics;

use alloy_primitives::B256;
use automation_primitives::{BlockHistory, BlockInfo};
use automation_providers::{Head, HeadBroadcaster, LogIndex};
use error::BlockSubscriberResult;
use parking_lot::{Mutex, RwLock};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// The number of blocks the subscriber keeps hashes for.
pub const DEFAULT_BLOCK_SIZE: u64 = 1024;

/// The number of blocks sent in each [`BlockHistory`].
pub const DEFAULT_HISTORY_SIZE: usize = 256;

/// The capacity of each subscription channel.
pub const DEFAULT_CHANNEL_SIZE: usize = 50;

/// The interval at which old block hashes are pruned.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// The configuration of the [`BlockSubscriber`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSubscriberConfig {
    /// The number of blocks to keep hashes for, also the depth walked on startup.
    pub block_size: u64,
    /// The number of blocks sent in each history.
    pub history_size: usize,
    /// The capacity of each subscription channel.
    pub channel_size: usize,
    /// The interval between two cleanups of the block map.
    pub cleanup_interval: Duration,
}

impl Default for BlockSubscriberConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            history_size: DEFAULT_HISTORY_SIZE,
            channel_size: DEFAULT_CHANNEL_SIZE,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

/// The lifecycle state of the [`BlockSubscriber`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// The subscriber is not running.
    #[default]
    Stopped,
    /// The subscriber is bootstrapping its block map.
    Starting,
    /// The subscriber is following the heads.
    Running,
}

#[derive(Debug, Default)]
struct SubscriberState {
    /// The known hashes by block number.
    blocks: HashMap<u64, B256>,
    /// The highest block number removed from the map.
    last_cleared: u64,
    /// The number of the head of the last history sent.
    last_sent: u64,
    /// The subscription channels by identifier.
    subscribers: HashMap<u64, mpsc::Sender<BlockHistory>>,
}

/// Follows the chain heads and broadcasts the recent [`BlockHistory`] to its subscribers.
#[derive(Debug)]
pub struct BlockSubscriber<L, H> {
    log_index: L,
    heads: H,
    config: BlockSubscriberConfig,
    inner: RwLock<SubscriberState>,
    latest: AtomicU64,
    next_id: AtomicU64,
    state: Mutex<ServiceState>,
    cancel: CancellationToken,
    metrics: BlockSubscriberMetrics,
}

impl<L, H> BlockSubscriber<L, H>
where
    L: LogIndex + 'static,
    H: HeadBroadcaster + 'static,
{
    /// Returns a new stopped [`BlockSubscriber`].
    pub fn new(log_index: L, heads: H, config: BlockSubscriberConfig) -> Self {
        Self {
            log_index,
            heads,
            config,
            inner: RwLock::new(SubscriberState::default()),
            latest: AtomicU64::new(0),
            next_id: AtomicU64::new(0),
            state: Mutex::new(ServiceState::Stopped),
            cancel: CancellationToken::new(),
            metrics: BlockSubscriberMetrics::default(),
        }
    }

    /// Bootstraps the block map from the log index, then spawns the head and cleanup tasks.
    pub async fn start(self: &Arc<Self>) -> Result<(), BlockSubscriberError> {
        {
            let mut state = self.state.lock();
            if *state != ServiceState::Stopped {
                return Err(BlockSubscriberError::AlreadyStarted);
            }
            *state = ServiceState::Starting;
        }

        if let Err(err) = self.bootstrap().await {
            *self.state.lock() = ServiceState::Stopped;
            return Err(err);
        }

        // subscribe before spawning so no head broadcast after start is missed.
        let heads = self.heads.subscribe();
        tokio::spawn(self.clone().run_heads(heads));
        tokio::spawn(self.clone().run_cleanup());

        *self.state.lock() = ServiceState::Running;
        tracing::info!(target: "automation::watcher", latest = self.latest_block(), "block subscriber started");
        Ok(())
    }

    /// Stops the background tasks and drops every subscription.
    pub fn close(&self) {
        self.cancel.cancel();
        self.inner.write().subscribers.clear();
        *self.state.lock() = ServiceState::Stopped;
        tracing::info!(target: "automation::watcher", "block subscriber closed");
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ServiceState {
        *self.state.lock()
    }

    /// Registers a new subscriber, returning its identifier and the receiving end of its
    /// channel.
    pub fn subscribe(&self) -> (u64, mpsc::Receiver<BlockHistory>) {
        let (tx, rx) = mpsc::channel(self.config.channel_size);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.write().subscribers.insert(id, tx);
        tracing::debug!(target: "automation::watcher", id, "new block subscriber");
        (id, rx)
    }

    /// Removes the subscriber, closing its channel.
    pub fn unsubscribe(&self, id: u64) -> Result<(), BlockSubscriberError> {
        self.inner
            .write()
            .subscribers
            .remove(&id)
            .map(|_| ())
            .ok_or(BlockSubscriberError::SubscriberNotFound(id))
    }

    /// Returns the number of the latest head processed.
    pub fn latest_block(&self) -> u64 {
        self.latest.load(Ordering::Acquire)
    }

    /// Returns the known hash of the block at the provided number.
    pub fn block_hash(&self, number: u64) -> Option<B256> {
        self.inner.read().blocks.get(&number).copied()
    }

    /// Returns a snapshot of the known block hashes.
    pub fn blocks(&self) -> HashMap<u64, B256> {
        self.inner.read().blocks.clone()
    }

    async fn bootstrap(&self) -> BlockSubscriberResult<()> {
        let latest = self.log_index.latest_block().await?;
        let first = latest.saturating_sub(self.config.block_size).saturating_add(1).max(1);
        let numbers: Vec<u64> = (first..=latest).collect();
        let blocks = self.log_index.get_blocks_range(&numbers).await?;
        if blocks.is_empty() && latest > 0 {
            return Err(BlockSubscriberError::NoBlocks);
        }

        let mut inner = self.inner.write();
        inner.blocks.extend(blocks.into_iter().map(|b| (b.number, b.hash)));
        inner.last_cleared = first.saturating_sub(1);
        self.latest.store(latest, Ordering::Release);
        self.metrics.tracked_blocks.set(inner.blocks.len() as f64);
        tracing::debug!(target: "automation::watcher", first, latest, count = inner.blocks.len(), "bootstrapped block map");
        Ok(())
    }

    async fn run_heads(self: Arc<Self>, mut heads: broadcast::Receiver<Arc<Head>>) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                head = heads.recv() => match head {
                    Ok(head) => self.process_head(&head).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(target: "automation::watcher", skipped, "head subscription lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::warn!(target: "automation::watcher", "head feed closed, stopping the block subscriber");
                        break;
                    }
                },
            }
        }
    }

    async fn run_cleanup(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.cleanup_interval);
        // the first tick completes immediately.
        interval.tick().await;
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => self.cleanup(),
            }
        }
    }

    /// Records the head and its known ancestors, then sends the resulting history to every
    /// subscriber in order. A full subscriber channel holds the head loop back.
    pub async fn process_head(&self, head: &Head) {
        let (history, subscribers) = {
            let mut inner = self.inner.write();
            for block in head.chain().take(self.config.block_size as usize) {
                if let Some(previous) = inner.blocks.insert(block.number, block.hash) {
                    if previous != block.hash {
                        self.metrics.reorg_overwrites.increment(1);
                        tracing::warn!(target: "automation::watcher", number = block.number, ?previous, hash = ?block.hash, "overwriting block hash");
                    }
                }
            }

            let history = self.build_history(&inner.blocks, head.number);
            inner.last_sent = head.number;
            self.metrics.tracked_blocks.set(inner.blocks.len() as f64);
            let subscribers: Vec<_> =
                inner.subscribers.iter().map(|(id, tx)| (*id, tx.clone())).collect();
            (history, subscribers)
        };
        self.latest.store(head.number, Ordering::Release);

        tracing::trace!(target: "automation::watcher", number = head.number, hash = ?head.hash, len = history.len(), "sending block history");
        for (id, tx) in subscribers {
            if tx.send(history.clone()).await.is_ok() {
                self.metrics.histories_sent.increment(1);
            } else {
                tracing::debug!(target: "automation::watcher", id, "subscriber channel closed");
            }
        }
    }

    fn build_history(&self, blocks: &HashMap<u64, B256>, head: u64) -> BlockHistory {
        let mut history = Vec::with_capacity(self.config.history_size);
        for number in (1..=head).rev().take(self.config.history_size) {
            match blocks.get(&number) {
                Some(hash) => history.push(BlockInfo::new(number, *hash)),
                None => {
                    tracing::debug!(target: "automation::watcher", number, "block missing from history");
                }
            }
        }
        BlockHistory(history)
    }

    /// Removes the blocks older than the retained window below the last sent head.
    pub fn cleanup(&self) {
        let mut inner = self.inner.write();
        let Some(upper) = inner.last_sent.checked_sub(self.config.block_size) else { return };
        if upper <= inner.last_cleared {
            return;
        }
        for number in inner.last_cleared + 1..=upper {
            inner.blocks.remove(&number);
        }
        tracing::debug!(target: "automation::watcher", from = inner.last_cleared + 1, to = upper, "cleared old blocks");
        inner.last_cleared = upper;
        self.metrics.tracked_blocks.set(inner.blocks.len() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automation_providers::test_utils::{block_hash, MockHeadBroadcaster, MockLogIndex};

    fn subscriber(
        latest: u64,
        config: BlockSubscriberConfig,
    ) -> (Arc<BlockSubscriber<MockLogIndex, MockHeadBroadcaster>>, MockLogIndex, MockHeadBroadcaster)
    {
        let index = MockLogIndex::new();
        index.set_latest_block(latest);
        for n in 1..=latest {
            index.set_block(n, block_hash(n));
        }
        let heads = MockHeadBroadcaster::new();
        (Arc::new(BlockSubscriber::new(index.clone(), heads.clone(), config)), index, heads)
    }

    #[tokio::test]
    async fn test_should_bootstrap_last_block_size_blocks() -> eyre::Result<()> {
        // Given
        let config = BlockSubscriberConfig { block_size: 10, ..Default::default() };
        let (subscriber, _, _) = subscriber(30, config);

        // When
        subscriber.start().await?;

        // Then
        assert_eq!(subscriber.state(), ServiceState::Running);
        assert_eq!(subscriber.latest_block(), 30);
        assert_eq!(subscriber.blocks().len(), 10);
        assert_eq!(subscriber.block_hash(21), Some(block_hash(21)));
        assert_eq!(subscriber.block_hash(20), None);
        assert!(matches!(subscriber.start().await, Err(BlockSubscriberError::AlreadyStarted)));

        subscriber.close();
        assert_eq!(subscriber.state(), ServiceState::Stopped);
        Ok(())
    }

    #[tokio::test]
    async fn test_should_fail_start_on_log_index_error() {
        let (subscriber, index, _) = subscriber(5, BlockSubscriberConfig::default());
        index.set_failing(true);

        assert!(matches!(subscriber.start().await, Err(BlockSubscriberError::Provider(_))));
        assert_eq!(subscriber.state(), ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_should_send_history_newest_first() -> eyre::Result<()> {
        // Given
        let config = BlockSubscriberConfig { history_size: 3, ..Default::default() };
        let (subscriber, _, _) = subscriber(4, config);
        subscriber.start().await?;
        let (_, mut rx) = subscriber.subscribe();

        // When
        subscriber.process_head(&Head::new(5, block_hash(5))).await;

        // Then
        let history = rx.recv().await.ok_or_else(|| eyre::eyre!("no history"))?;
        let numbers: Vec<_> = history.blocks().iter().map(|b| b.number).collect();
        assert_eq!(numbers, vec![5, 4, 3]);
        assert_eq!(subscriber.latest_block(), 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_should_skip_missing_blocks_in_history() {
        let config = BlockSubscriberConfig { history_size: 4, ..Default::default() };
        let (subscriber, _, _) = subscriber(0, config);
        let (_, mut rx) = subscriber.subscribe();

        subscriber.process_head(&Head::new(3, block_hash(3))).await;
        subscriber.process_head(&Head::new(5, block_hash(5))).await;

        let _ = rx.recv().await;
        let history = rx.recv().await.unwrap();
        let numbers: Vec<_> = history.blocks().iter().map(|b| b.number).collect();
        assert_eq!(numbers, vec![5, 3]);
    }

    #[test]
    fn test_should_unsubscribe_known_ids_only() {
        let (subscriber, _, _) = subscriber(0, BlockSubscriberConfig::default());
        let (id, _rx) = subscriber.subscribe();

        assert!(subscriber.unsubscribe(id).is_ok());
        let err = subscriber.unsubscribe(id).unwrap_err();
        assert_eq!(err.to_string(), format!("subscriber {id} does not exist"));
    }

    #[tokio::test]
    async fn test_should_clear_blocks_below_retained_window() {
        // Given
        let config = BlockSubscriberConfig { block_size: 4, ..Default::default() };
        let (subscriber, _, _) = subscriber(0, config);
        for n in 1..=10 {
            subscriber.process_head(&Head::new(n, block_hash(n))).await;
        }

        // When
        subscriber.cleanup();

        // Then
        let mut numbers: Vec<_> = subscriber.blocks().into_keys().collect();
        numbers.sort_unstable();
        assert_eq!(numbers, vec![7, 8, 9, 10]);

        // a second cleanup without new heads is a no op.
        subscriber.cleanup();
        assert_eq!(subscriber.blocks().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_clear_blocks_on_cleanup_interval() -> eyre::Result<()> {
        // Given
        assert_eq!(DEFAULT_CLEANUP_INTERVAL, Duration::from_secs(15 * 60));
        let config = BlockSubscriberConfig {
            block_size: 4,
            cleanup_interval: Duration::from_millis(100),
            ..Default::default()
        };
        let (subscriber, _, _) = subscriber(0, config);
        subscriber.start().await?;
        for n in 1..=10 {
            subscriber.process_head(&Head::new(n, block_hash(n))).await;
        }
        assert_eq!(subscriber.blocks().len(), 10);

        // When
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Then
        assert_eq!(subscriber.blocks().len(), 4);
        subscriber.close();
        Ok(())
    }
}
