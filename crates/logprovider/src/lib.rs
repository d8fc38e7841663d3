//! Log event provider for the automation node.
//!
//! The [`LogEventProvider`] keeps one filter per log trigger upkeep and incrementally polls the
//! log index for the logs matching it. Every upkeep owns two rate limiters, one on the block
//! range polled and one on the number of logs returned. An upkeep far behind the chain head only
//! polls the most recent blocks its budget allows, and logs over the log budget are cut at the
//! last one that fits. Whatever is skipped this way is picked up by the [`LogRecoverer`].

mod error;
pub use error::LogProviderError;

mod filter;
pub use filter::{filter_name, UpkeepFilter};

mod limiter;
pub use limiter::{LimiterConfig, RateLimiter};

mod metrics;
use metrics::LogProviderMetrics;

mod recoverer;
pub use recoverer::{
    LogRecoverer, ProposalDataSource, RecovererConfig, DEFAULT_MAX_PENDING_PER_UPKEEP,
    DEFAULT_MAX_PROPOSALS, DEFAULT_PROPOSALS_PER_UPKEEP, DEFAULT_RECOVERY_BATCH_SIZE,
    DEFAULT_RECOVERY_BUFFER_BLOCKS, DEFAULT_RECOVERY_BURST_BLOCKS, DEFAULT_RECOVERY_INTERVAL,
    DEFAULT_RECOVERY_WINDOW_BLOCKS, DEFAULT_VISITED_TTL,
};

use alloy_rpc_types_eth::Log;
use automation_abi::{pack_log, AbiError};
use automation_primitives::{
    LogTriggerConfig, LogTriggerExtension, Trigger, UpkeepId, UpkeepPayload,
};
use automation_providers::{LogIndex, ProviderError};
use futures::{stream, StreamExt};
use parking_lot::RwLock;
use std::{collections::HashMap, time::Duration};

/// The number of blocks polled on the first poll of an upkeep.
pub const DEFAULT_LOOKBACK_BLOCKS: u64 = 200;

/// The number of blocks re-polled below the last polled block, to catch late indexed logs.
pub const DEFAULT_LOOKBACK_BUFFER: u64 = 10;

/// The number of filters polled concurrently.
pub const DEFAULT_WORKERS: usize = 4;

/// The retention of the logs matching an upkeep filter.
pub const DEFAULT_LOG_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// The configuration of the [`LogEventProvider`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogProviderConfig {
    /// The number of blocks polled on the first poll of an upkeep.
    pub lookback_blocks: u64,
    /// The number of blocks re-polled below the last polled block.
    pub lookback_buffer: u64,
    /// The limit on the block range polled per upkeep.
    pub block_limit: LimiterConfig,
    /// The limit on the logs returned per upkeep.
    pub log_limit: LimiterConfig,
    /// The number of filters polled concurrently.
    pub workers: usize,
    /// The retention of the logs in the log index.
    pub retention: Option<Duration>,
}

impl Default for LogProviderConfig {
    fn default() -> Self {
        Self {
            lookback_blocks: DEFAULT_LOOKBACK_BLOCKS,
            lookback_buffer: DEFAULT_LOOKBACK_BUFFER,
            block_limit: LimiterConfig::new(100.0, 100),
            log_limit: LimiterConfig::new(10.0, 50),
            workers: DEFAULT_WORKERS,
            retention: Some(DEFAULT_LOG_RETENTION),
        }
    }
}

/// A log returned for a log trigger upkeep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpkeepLog {
    /// The upkeep whose filter matched the log.
    pub upkeep_id: UpkeepId,
    /// The matching log.
    pub log: Log,
}

/// The outcome of polling a single filter.
#[derive(Debug)]
struct PollOutcome {
    filter: UpkeepFilter,
    logs: Vec<UpkeepLog>,
    advanced: bool,
}

/// Polls the log index for the logs of the registered log trigger upkeeps.
#[derive(Debug)]
pub struct LogEventProvider<L> {
    log_index: L,
    config: LogProviderConfig,
    filters: RwLock<HashMap<UpkeepId, UpkeepFilter>>,
    metrics: LogProviderMetrics,
}

impl<L: LogIndex> LogEventProvider<L> {
    /// Returns a new [`LogEventProvider`] without any filter.
    pub fn new(log_index: L, config: LogProviderConfig) -> Self {
        Self {
            log_index,
            config,
            filters: RwLock::new(HashMap::new()),
            metrics: LogProviderMetrics::default(),
        }
    }

    /// Registers the filter of the upkeep with the log index. Fails if the config is invalid or
    /// if the upkeep already has a filter.
    pub async fn register_filter(
        &self,
        upkeep_id: UpkeepId,
        config: LogTriggerConfig,
        config_block: u64,
    ) -> Result<(), LogProviderError> {
        filter::validate_config(&config)?;
        if self.filters.read().contains_key(&upkeep_id) {
            return Err(LogProviderError::DuplicateFilter(upkeep_id));
        }

        let entry = UpkeepFilter::new(
            upkeep_id,
            config,
            config_block,
            self.config.block_limit,
            self.config.log_limit,
        );
        self.log_index.register_filter(entry.log_filter(self.config.retention)).await?;

        let mut filters = self.filters.write();
        filters.insert(upkeep_id, entry);
        self.metrics.filters.set(filters.len() as f64);
        tracing::debug!(target: "automation::logprovider", %upkeep_id, config_block, "registered upkeep filter");
        Ok(())
    }

    /// Replaces the filter of the upkeep with one built from the config. A config older than
    /// the one currently registered is ignored. Returns true if the filter was replaced.
    pub async fn refresh_filter(
        &self,
        upkeep_id: UpkeepId,
        config: LogTriggerConfig,
        config_block: u64,
    ) -> Result<bool, LogProviderError> {
        filter::validate_config(&config)?;
        let current = self.filters.read().get(&upkeep_id).map(|f| (f.config, f.config_block));
        match current {
            Some((_, block)) if block > config_block => {
                tracing::debug!(target: "automation::logprovider", %upkeep_id, block, config_block, "ignoring older upkeep config");
                return Ok(false);
            }
            Some((current, block)) if current == config && block == config_block => {
                return Ok(false);
            }
            Some(_) => self.unregister_filter(upkeep_id).await?,
            None => {}
        }
        self.register_filter(upkeep_id, config, config_block).await?;
        Ok(true)
    }

    /// Removes the filter of the upkeep from the log index and from the provider.
    pub async fn unregister_filter(&self, upkeep_id: UpkeepId) -> Result<(), LogProviderError> {
        if !self.filters.read().contains_key(&upkeep_id) {
            return Err(LogProviderError::FilterNotFound(upkeep_id));
        }

        match self.log_index.unregister_filter(&filter_name(&upkeep_id)).await {
            Ok(()) | Err(ProviderError::FilterNotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }

        let mut filters = self.filters.write();
        filters.remove(&upkeep_id);
        self.metrics.filters.set(filters.len() as f64);
        tracing::debug!(target: "automation::logprovider", %upkeep_id, "unregistered upkeep filter");
        Ok(())
    }

    /// Returns true if a filter is registered for the upkeep.
    pub fn has_filter(&self, upkeep_id: &UpkeepId) -> bool {
        self.filters.read().contains_key(upkeep_id)
    }

    /// Returns the upkeeps with a registered filter.
    pub fn upkeep_ids(&self) -> Vec<UpkeepId> {
        self.filters.read().keys().copied().collect()
    }

    /// Returns the filter registered for the upkeep.
    pub fn filter(&self, upkeep_id: &UpkeepId) -> Option<UpkeepFilter> {
        self.filters.read().get(upkeep_id).cloned()
    }

    /// Polls the filters of the provided upkeeps and returns the logs not returned before.
    ///
    /// Upkeeps over their block or log budget are skipped for the round. Only the filters
    /// whose poll cursor advanced are written back.
    #[tracing::instrument(target = "automation::logprovider", skip_all, fields(upkeeps = ids.len()))]
    pub async fn get_logs(&self, ids: &[UpkeepId]) -> Result<Vec<UpkeepLog>, LogProviderError> {
        let latest = self.log_index.latest_block().await?;
        let entries: Vec<UpkeepFilter> = {
            let filters = self.filters.read();
            ids.iter().filter_map(|id| filters.get(id).cloned()).collect()
        };

        let outcomes: Vec<PollOutcome> = stream::iter(entries)
            .map(|entry| self.poll_filter(entry, latest))
            .buffer_unordered(self.config.workers.max(1))
            .collect()
            .await;

        let mut logs = Vec::new();
        {
            let mut filters = self.filters.write();
            for outcome in outcomes {
                logs.extend(outcome.logs);
                if !outcome.advanced {
                    continue;
                }
                // the filter may have been replaced or removed while polling.
                if let Some(current) = filters.get_mut(&outcome.filter.upkeep_id) {
                    if current.config_block == outcome.filter.config_block &&
                        current.last_poll_block < outcome.filter.last_poll_block
                    {
                        *current = outcome.filter;
                    }
                }
            }
        }

        self.metrics.logs_fetched.increment(logs.len() as u64);
        tracing::debug!(target: "automation::logprovider", latest, logs = logs.len(), "polled upkeep filters");
        Ok(logs)
    }

    async fn poll_filter(&self, mut filter: UpkeepFilter, latest: u64) -> PollOutcome {
        let upkeep_id = filter.upkeep_id;
        let last_poll = filter.last_poll_block;
        if last_poll >= latest {
            return PollOutcome { filter, logs: vec![], advanced: false };
        }

        let mut start = if last_poll == 0 {
            latest.saturating_sub(self.config.lookback_blocks)
        } else {
            last_poll.saturating_sub(self.config.lookback_buffer)
        };

        // the first poll catches up on the whole lookback window at once.
        let burst = filter.block_limiter.burst();
        let limit = if last_poll == 0 { self.config.lookback_blocks.max(burst) } else { burst };
        let floor = latest.saturating_sub(limit);
        if start < floor {
            tracing::debug!(target: "automation::logprovider", %upkeep_id, start, floor, "upkeep fell behind, leaving older blocks to the recoverer");
            start = floor;
        }

        let reserved = if last_poll == 0 {
            filter.block_limiter.set_burst(limit);
            let reserved = filter.block_limiter.try_acquire(latest - start);
            filter.block_limiter.set_burst(burst);
            reserved
        } else {
            filter.block_limiter.try_acquire(latest - start)
        };
        if !reserved {
            self.metrics.block_limit_skips.increment(1);
            tracing::warn!(target: "automation::logprovider", %upkeep_id, start, latest, "block range limit exceeded, skipping upkeep");
            return PollOutcome { filter, logs: vec![], advanced: false };
        }

        let logs = match self
            .log_index
            .logs_with_sigs(start, latest, &[filter.config.topic0], filter.config.contract_address)
            .await
        {
            Ok(logs) => logs,
            Err(err) => {
                tracing::warn!(target: "automation::logprovider", %upkeep_id, ?err, "failed to fetch upkeep logs");
                return PollOutcome { filter, logs: vec![], advanced: false };
            }
        };

        let mut logs: Vec<Log> = logs
            .into_iter()
            .filter(|log| {
                log.block_number.is_some_and(|n| n > last_poll) &&
                    filter.config.matches_topics(log.topics())
            })
            .collect();
        logs.sort_by_key(|log| (log.block_number, log.log_index));

        let allowed = filter.log_limiter.try_acquire_up_to(logs.len() as u64) as usize;
        let mut cursor = latest;
        if allowed < logs.len() {
            self.metrics.log_limit_skips.increment(1);
            let Some(last) = allowed.checked_sub(1).and_then(|i| logs[i].block_number) else {
                tracing::warn!(target: "automation::logprovider", %upkeep_id, logs = logs.len(), "log limit exceeded, skipping upkeep");
                return PollOutcome { filter, logs: vec![], advanced: false };
            };
            // logs of the last block past the budget are left to the recoverer.
            tracing::debug!(target: "automation::logprovider", %upkeep_id, logs = logs.len(), allowed, last, "log limit exceeded, truncating upkeep logs");
            logs.truncate(allowed);
            cursor = last;
        }

        tracing::trace!(target: "automation::logprovider", %upkeep_id, start, cursor, logs = logs.len(), "polled upkeep filter");
        filter.last_poll_block = cursor;
        let logs = logs.into_iter().map(|log| UpkeepLog { upkeep_id, log }).collect();
        PollOutcome { filter, logs, advanced: cursor > last_poll }
    }

    /// Polls every registered filter and returns one payload per new log.
    pub async fn get_latest_payloads(&self) -> Result<Vec<UpkeepPayload>, LogProviderError> {
        let logs = self.get_logs(&self.upkeep_ids()).await?;
        let mut payloads = Vec::with_capacity(logs.len());
        for UpkeepLog { upkeep_id, log } in logs {
            match log_payload(upkeep_id, &log) {
                Ok(payload) => payloads.push(payload),
                Err(err) => {
                    tracing::warn!(target: "automation::logprovider", %upkeep_id, ?err, "skipping malformed log");
                }
            }
        }
        Ok(payloads)
    }

    /// Moves the recovery cursor of the upkeep forward. Ignored if the filter was replaced
    /// since the cursor was read.
    pub fn set_last_repoll_block(&self, upkeep_id: UpkeepId, config_block: u64, block: u64) {
        if let Some(filter) = self.filters.write().get_mut(&upkeep_id) {
            if filter.config_block == config_block && filter.last_repoll_block < block {
                filter.last_repoll_block = block;
            }
        }
    }

    /// Returns the registered filters.
    pub fn filters(&self) -> Vec<UpkeepFilter> {
        self.filters.read().values().cloned().collect()
    }

    /// Returns the log index polled by the provider.
    pub const fn log_index(&self) -> &L {
        &self.log_index
    }
}

/// Returns the check payload of the log for the upkeep.
pub fn log_payload(upkeep_id: UpkeepId, log: &Log) -> Result<UpkeepPayload, LogProviderError> {
    let check_data = pack_log(log)?;
    let block_number = log.block_number.ok_or(AbiError::IncompleteLog("block_number"))?;
    let block_hash = log.block_hash.ok_or(AbiError::IncompleteLog("block_hash"))?;
    let tx_hash = log.transaction_hash.ok_or(AbiError::IncompleteLog("transaction_hash"))?;
    let log_index = log.log_index.ok_or(AbiError::IncompleteLog("log_index"))?;
    let log_index = u32::try_from(log_index).map_err(|_| AbiError::Overflow("log index"))?;

    let ext = LogTriggerExtension { tx_hash, log_index, block_hash, block_number };
    Ok(UpkeepPayload::new(upkeep_id, Trigger::with_log(block_number, block_hash, ext), check_data))
}
