//! Recovery of the logs the [`LogEventProvider`] skipped.
//!
//! The recoverer rescans, behind the chain head, the blocks of the upkeeps whose logs may have
//! been missed: blocks cut by the poll budgets, or logs indexed late. Logs whose work is still
//! unknown to the upkeep state store are queued and proposed to the network in small batches.

use crate::{
    log_payload, metrics::LogRecovererMetrics, LogEventProvider, LogProviderError, UpkeepFilter,
};

use alloy_primitives::{keccak256, Bytes};
use automation_abi::pack_log;
use automation_primitives::{
    CoordinatedBlockProposal, UpkeepId, UpkeepPayload, UpkeepState, UpkeepType, WorkId,
};
use automation_providers::{ChainClient, LogIndex};
use automation_upkeepstate::UpkeepStateReader;
use futures::future::join_all;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;

/// The number of blocks behind the head that can still be recovered, a day of one second blocks.
pub const DEFAULT_RECOVERY_WINDOW_BLOCKS: u64 = 24 * 60 * 60;

/// The number of blocks scanned per upkeep and round.
pub const DEFAULT_RECOVERY_BUFFER_BLOCKS: u64 = 200;

/// The number of blocks scanned per upkeep and round when far behind.
pub const DEFAULT_RECOVERY_BURST_BLOCKS: u64 = 500;

/// The number of upkeeps scanned per round.
pub const DEFAULT_RECOVERY_BATCH_SIZE: usize = 10;

/// The maximum number of payloads returned per call.
pub const DEFAULT_MAX_PROPOSALS: usize = 20;

/// The maximum number of payloads of a single upkeep returned per call.
pub const DEFAULT_PROPOSALS_PER_UPKEEP: usize = 5;

/// The maximum number of payloads of a single upkeep waiting to be proposed.
pub const DEFAULT_MAX_PENDING_PER_UPKEEP: usize = 500;

/// How long a visited log is kept before its block is checked against the recovery window.
pub const DEFAULT_VISITED_TTL: Duration = Duration::from_secs(10 * 60);

/// The interval between two recovery rounds.
pub const DEFAULT_RECOVERY_INTERVAL: Duration = Duration::from_secs(5);

/// An upkeep whose scan cursor trails the window end by this many buffers scans a burst.
const LAGGING_BUFFERS: u64 = 100;

/// The configuration of the [`LogRecoverer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecovererConfig {
    /// The number of blocks left to the log provider below the head.
    pub lookback_blocks: u64,
    /// The number of blocks behind the head that can still be recovered.
    pub window_blocks: u64,
    /// The number of blocks scanned per upkeep and round.
    pub buffer_blocks: u64,
    /// The number of blocks scanned per upkeep and round when far behind.
    pub burst_blocks: u64,
    /// The number of upkeeps scanned per round.
    pub batch_size: usize,
    /// The maximum number of payloads returned per call.
    pub max_proposals: usize,
    /// The maximum number of payloads of a single upkeep returned per call.
    pub proposals_per_upkeep: usize,
    /// The maximum number of payloads of a single upkeep waiting to be proposed.
    pub max_pending_per_upkeep: usize,
    /// How long a visited log is kept before being checked for expiry.
    pub visited_ttl: Duration,
    /// The interval between two recovery rounds.
    pub recovery_interval: Duration,
    /// The interval between two cleanups of the visited logs.
    pub cleanup_interval: Duration,
}

impl Default for RecovererConfig {
    fn default() -> Self {
        Self {
            lookback_blocks: crate::DEFAULT_LOOKBACK_BLOCKS,
            window_blocks: DEFAULT_RECOVERY_WINDOW_BLOCKS,
            buffer_blocks: DEFAULT_RECOVERY_BUFFER_BLOCKS,
            burst_blocks: DEFAULT_RECOVERY_BURST_BLOCKS,
            batch_size: DEFAULT_RECOVERY_BATCH_SIZE,
            max_proposals: DEFAULT_MAX_PROPOSALS,
            proposals_per_upkeep: DEFAULT_PROPOSALS_PER_UPKEEP,
            max_pending_per_upkeep: DEFAULT_MAX_PENDING_PER_UPKEEP,
            visited_ttl: DEFAULT_VISITED_TTL,
            recovery_interval: DEFAULT_RECOVERY_INTERVAL,
            cleanup_interval: DEFAULT_VISITED_TTL / 2,
        }
    }
}

/// Resolves the check data of the log a proposal points at.
#[async_trait::async_trait]
#[auto_impl::auto_impl(Arc)]
pub trait ProposalDataSource: Send + Sync {
    /// Returns the packed log of the log trigger proposal.
    async fn proposal_data(
        &self,
        proposal: &CoordinatedBlockProposal,
    ) -> Result<Bytes, LogProviderError>;
}

#[derive(Debug, Clone)]
struct Visited {
    at: Instant,
    payload: UpkeepPayload,
}

#[derive(Debug, Default)]
struct RecoveryQueue {
    pending: Vec<UpkeepPayload>,
    visited: HashMap<WorkId, Visited>,
}

impl RecoveryQueue {
    fn add_pending(
        &mut self,
        payload: UpkeepPayload,
        max_per_upkeep: usize,
    ) -> Result<(), LogProviderError> {
        if self.pending.iter().any(|p| p.work_id == payload.work_id) {
            return Ok(());
        }
        let count = self.pending.iter().filter(|p| p.upkeep_id == payload.upkeep_id).count();
        if count >= max_per_upkeep {
            return Err(LogProviderError::PendingLimit(payload.upkeep_id));
        }
        self.pending.push(payload);
        Ok(())
    }

    fn remove_pending(&mut self, work_id: &WorkId) {
        self.pending.retain(|p| p.work_id != *work_id);
    }
}

/// Rescans the recovery window for logs the [`LogEventProvider`] did not return.
#[derive(Debug)]
pub struct LogRecoverer<L, C, S> {
    provider: Arc<LogEventProvider<L>>,
    client: C,
    states: S,
    config: RecovererConfig,
    queue: Mutex<RecoveryQueue>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    metrics: LogRecovererMetrics,
}

impl<L, C, S> LogRecoverer<L, C, S>
where
    L: LogIndex + 'static,
    C: ChainClient + 'static,
    S: UpkeepStateReader + 'static,
{
    /// Returns a new stopped [`LogRecoverer`] over the filters of the provider.
    pub fn new(
        provider: Arc<LogEventProvider<L>>,
        client: C,
        states: S,
        config: RecovererConfig,
    ) -> Self {
        Self {
            provider,
            client,
            states,
            config,
            queue: Mutex::new(RecoveryQueue::default()),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            metrics: LogRecovererMetrics::default(),
        }
    }

    /// Spawns the recovery and cleanup loop. Starting twice is a no op.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        *task = Some(tokio::spawn(self.clone().run()));
        tracing::info!(target: "automation::logprovider", "log recoverer started");
    }

    /// Stops the background loop and waits for it to exit.
    pub async fn close(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!(target: "automation::logprovider", ?err, "log recoverer loop failed");
            }
        }
        tracing::info!(target: "automation::logprovider", "log recoverer closed");
    }

    async fn run(self: Arc<Self>) {
        let mut recover = tokio::time::interval(self.config.recovery_interval);
        let mut cleanup = tokio::time::interval(self.config.cleanup_interval);
        cleanup.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = recover.tick() => {
                    if let Err(err) = self.recover().await {
                        tracing::warn!(target: "automation::logprovider", ?err, "log recovery failed");
                    }
                }
                _ = cleanup.tick() => {
                    if let Err(err) = self.clean().await {
                        tracing::warn!(target: "automation::logprovider", ?err, "log recoverer cleanup failed");
                    }
                }
            }
        }
    }

    /// Returns the first and last recoverable blocks for the latest block.
    fn recovery_window(&self, latest: u64) -> (u64, u64) {
        (
            latest.saturating_sub(self.config.window_blocks),
            latest.saturating_sub(self.config.lookback_blocks),
        )
    }

    fn is_recoverable(&self, block: u64, latest: u64) -> bool {
        let (start, _) = self.recovery_window(latest);
        (start..=latest).contains(&block)
    }

    /// Scans the next range of a batch of upkeeps and queues the logs of unknown work.
    /// Failures of single upkeeps are logged and leave their cursor in place.
    pub async fn recover(&self) -> Result<(), LogProviderError> {
        let latest = self.provider.log_index().latest_block().await?;
        let (start, end) = self.recovery_window(latest);
        if end == 0 {
            return Ok(());
        }

        let filters = self.filter_batch(end);
        if filters.is_empty() {
            return Ok(());
        }
        tracing::debug!(target: "automation::logprovider", latest, filters = filters.len(), "recovering upkeep logs");

        let results = join_all(filters.into_iter().map(|filter| async move {
            let upkeep_id = filter.upkeep_id;
            (upkeep_id, self.recover_filter(filter, start, end).await)
        }))
        .await;
        for (upkeep_id, result) in results {
            if let Err(err) = result {
                self.metrics.filter_failures.increment(1);
                tracing::warn!(target: "automation::logprovider", %upkeep_id, ?err, "failed to recover upkeep logs");
            }
        }
        Ok(())
    }

    fn filter_batch(&self, end: u64) -> Vec<UpkeepFilter> {
        let filters = self
            .provider
            .filters()
            .into_iter()
            .filter(|f| f.config_block <= end && f.last_repoll_block <= end)
            .collect();
        self.select_filter_batch(filters)
    }

    /// Keeps half of the batch for the most lagging upkeeps and draws the rest at random.
    fn select_filter_batch(&self, mut filters: Vec<UpkeepFilter>) -> Vec<UpkeepFilter> {
        let size = self.config.batch_size;
        if filters.len() <= size {
            return filters;
        }
        filters.sort_by_key(|f| f.last_repoll_block);
        let mut rest = filters.split_off(size / 2);
        rest.shuffle(&mut rand::rng());
        let missing = size - filters.len();
        filters.extend(rest.into_iter().take(missing));
        filters
    }

    async fn recover_filter(
        &self,
        filter: UpkeepFilter,
        window_start: u64,
        window_end: u64,
    ) -> Result<(), LogProviderError> {
        let upkeep_id = filter.upkeep_id;
        let start = (filter.last_repoll_block + 1).max(filter.config_block).max(window_start);
        let mut end = start + self.config.buffer_blocks;
        if window_end.saturating_sub(end) > LAGGING_BUFFERS * self.config.buffer_blocks {
            end = start + self.config.burst_blocks;
        }
        let end = end.min(window_end);
        if start > end {
            return Ok(());
        }

        let logs = self
            .provider
            .log_index()
            .logs_with_sigs(start, end, &[filter.config.topic0], filter.config.contract_address)
            .await?;
        let payloads: Vec<UpkeepPayload> = logs
            .iter()
            .filter(|log| filter.config.matches_topics(log.topics()))
            .filter_map(|log| match log_payload(upkeep_id, log) {
                Ok(payload) => Some(payload),
                Err(err) => {
                    tracing::warn!(target: "automation::logprovider", %upkeep_id, ?err, "skipping malformed log");
                    None
                }
            })
            .collect();

        let payloads = if payloads.is_empty() {
            payloads
        } else {
            let work_ids: Vec<WorkId> = payloads.iter().map(|p| p.work_id).collect();
            let states = self.states.select_by_work_ids(&work_ids).await?;
            filter_finalized_states(payloads, &states)
        };

        let (added, visited) = self.populate_pending(payloads)?;
        if added > 0 {
            self.metrics.recovered.increment(added as u64);
            tracing::debug!(target: "automation::logprovider", %upkeep_id, start, end, added, visited, "recovered upkeep logs");
        }
        self.provider.set_last_repoll_block(upkeep_id, filter.config_block, end);
        Ok(())
    }

    /// Queues the payloads not visited yet. Stops at the first upkeep over its pending limit.
    fn populate_pending(
        &self,
        payloads: Vec<UpkeepPayload>,
    ) -> Result<(usize, usize), LogProviderError> {
        let mut queue = self.queue.lock();
        let (mut added, mut visited) = (0, 0);
        let result = payloads.into_iter().try_for_each(|payload| -> Result<(), LogProviderError> {
            if queue.visited.contains_key(&payload.work_id) {
                visited += 1;
                return Ok(());
            }
            queue.add_pending(payload.clone(), self.config.max_pending_per_upkeep)?;
            queue.visited.insert(payload.work_id, Visited { at: Instant::now(), payload });
            added += 1;
            Ok(())
        });
        self.metrics.pending.set(queue.pending.len() as f64);
        result.map(|()| (added, visited))
    }

    /// Takes the next payloads to propose, at most [`RecovererConfig::proposals_per_upkeep`]
    /// per upkeep. The returned payloads leave the queue.
    pub async fn get_recovery_proposals(&self) -> Result<Vec<UpkeepPayload>, LogProviderError> {
        let latest = self.provider.log_index().latest_block().await?;
        let mut queue = self.queue.lock();
        if queue.pending.is_empty() {
            return Ok(Vec::new());
        }

        // the order changes every block so no upkeep starves the others.
        let seed = latest.to_be_bytes();
        queue.pending.sort_by_cached_key(|p| keccak256([p.work_id.0.as_slice(), seed.as_slice()].concat()));

        let mut per_upkeep: HashMap<UpkeepId, usize> = HashMap::new();
        let mut proposals = Vec::new();
        let mut pending = Vec::new();
        for payload in std::mem::take(&mut queue.pending) {
            let count = per_upkeep.entry(payload.upkeep_id).or_default();
            if proposals.len() >= self.config.max_proposals ||
                *count >= self.config.proposals_per_upkeep
            {
                pending.push(payload);
                continue;
            }
            *count += 1;
            proposals.push(payload);
        }
        queue.pending = pending;
        self.metrics.pending.set(queue.pending.len() as f64);
        Ok(proposals)
    }

    /// Drops the visited logs older than the TTL whose block left the recovery window. The
    /// others are kept for another TTL.
    pub async fn clean(&self) -> Result<(), LogProviderError> {
        let expired: Vec<WorkId> = {
            let queue = self.queue.lock();
            queue
                .visited
                .iter()
                .filter(|(_, v)| v.at.elapsed() > self.config.visited_ttl)
                .map(|(id, _)| *id)
                .collect()
        };
        if expired.is_empty() {
            return Ok(());
        }

        let latest = self.provider.log_index().latest_block().await?;
        let (start, _) = self.recovery_window(latest);
        let now = Instant::now();
        let mut queue = self.queue.lock();
        let mut removed = 0u64;
        for work_id in expired {
            let Some(visited) = queue.visited.get_mut(&work_id) else { continue };
            let block = visited.payload.trigger.log_trigger_extension.map(|ext| ext.block_number);
            if block.unwrap_or_default() < start {
                queue.visited.remove(&work_id);
                queue.remove_pending(&work_id);
                removed += 1;
            } else {
                visited.at = now;
            }
        }
        self.metrics.expired.increment(removed);
        self.metrics.pending.set(queue.pending.len() as f64);
        tracing::debug!(target: "automation::logprovider", removed, "cleaned visited logs");
        Ok(())
    }

    /// Returns the packed log the proposal points at, once the log is checked to be mined,
    /// recoverable and not yet performed. A zero log block is resolved from the transaction.
    pub async fn get_proposal_data(
        &self,
        proposal: &CoordinatedBlockProposal,
    ) -> Result<Bytes, LogProviderError> {
        let upkeep_id = proposal.upkeep_id;
        if upkeep_id.upkeep_type() != UpkeepType::LogTrigger {
            return Err(LogProviderError::NotLogTrigger(upkeep_id));
        }
        let filter =
            self.provider.filter(&upkeep_id).ok_or(LogProviderError::FilterNotFound(upkeep_id))?;
        let ext = proposal
            .trigger
            .log_trigger_extension
            .ok_or(LogProviderError::InvalidTrigger(upkeep_id))?;
        let latest = self.provider.log_index().latest_block().await?;

        let (tx_block, tx_block_hash) = self
            .client
            .transaction_receipt(ext.tx_hash)
            .await?
            .and_then(|receipt| receipt.block_number.zip(receipt.block_hash))
            .ok_or(LogProviderError::TxBlockNotFound(ext.tx_hash))?;
        if !ext.block_hash.is_zero() && ext.block_hash != tx_block_hash {
            return Err(LogProviderError::LogReorged(ext.tx_hash));
        }
        let block = if ext.block_number == 0 { tx_block } else { ext.block_number };
        if !self.is_recoverable(block, latest) {
            return Err(LogProviderError::NotRecoverable(block));
        }

        let states = self.states.select_by_work_ids(&[proposal.work_id]).await?;
        if states.first().copied().unwrap_or_default() != UpkeepState::Unknown {
            return Err(LogProviderError::StateNotRecoverable(proposal.work_id));
        }

        let logs = self
            .provider
            .log_index()
            .logs_with_sigs(block, block, &[filter.config.topic0], filter.config.contract_address)
            .await?;
        let log = logs
            .iter()
            .find(|log| {
                log.transaction_hash == Some(ext.tx_hash) &&
                    log.log_index == Some(u64::from(ext.log_index))
            })
            .ok_or(LogProviderError::LogNotFound(upkeep_id))?;
        Ok(pack_log(log)?)
    }
}

#[async_trait::async_trait]
impl<L, C, S> ProposalDataSource for LogRecoverer<L, C, S>
where
    L: LogIndex + 'static,
    C: ChainClient + 'static,
    S: UpkeepStateReader + 'static,
{
    async fn proposal_data(
        &self,
        proposal: &CoordinatedBlockProposal,
    ) -> Result<Bytes, LogProviderError> {
        self.get_proposal_data(proposal).await
    }
}

/// Drops the payloads whose work was performed or found ineligible.
fn filter_finalized_states(
    payloads: Vec<UpkeepPayload>,
    states: &[UpkeepState],
) -> Vec<UpkeepPayload> {
    payloads
        .into_iter()
        .enumerate()
        .filter(|(i, _)| states.get(*i).copied().unwrap_or_default() == UpkeepState::Unknown)
        .map(|(_, payload)| payload)
        .collect()
}
