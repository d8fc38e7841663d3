//! The automation registry orchestrator.
//!
//! The [`EvmRegistry`] keeps the set of active upkeeps and the log trigger filters in sync with
//! the registry contract, and runs the check pipeline over the payloads proposed by the OCR
//! plugin. The plugin boundary types ([`Encoder`], [`PayloadBuilder`],
//! [`ConditionalUpkeepProvider`] and [`TransmitEventProvider`]) live alongside it.

pub use active::ActiveUpkeepList;
mod active;

pub use args::{RegistryArgs, StreamsArgs};
mod args;

pub use blocks::BlockSource;
mod blocks;

mod check;

pub use conditional::ConditionalUpkeepProvider;
mod conditional;

pub use encoder::Encoder;
mod encoder;

pub use error::RegistryError;
mod error;

pub use events::LifecycleEvent;
mod events;

use metrics::RegistryMetrics;
mod metrics;

pub use payload::PayloadBuilder;
mod payload;

pub use transmit::{TransmitEventProvider, DEFAULT_TRANSMIT_LOOKBACK_BLOCKS};
mod transmit;

#[cfg(any(test, feature = "test-utils"))]
/// Common test helpers
pub mod test_utils;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rpc_types_eth::Log;
use alloy_sol_types::{SolCall, SolEvent};
use automation_abi::{
    try_decode_log, unpack_log_trigger_config, IAutomationRegistry, UpkeepTriggerConfigSet,
    UpkeepUnpaused,
};
use automation_logprovider::LogEventProvider;
use automation_primitives::{UpkeepId, UpkeepType};
use automation_providers::{CallRequest, ChainClient, LogFilter, LogIndex};
use automation_streams::{HttpClient, Streams};
use automation_upkeepstate::UpkeepStateUpdater;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// The interval between two full refreshes of the active upkeeps.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// The interval between two polls of the lifecycle logs.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// The number of active upkeep ids read per contract call.
pub const DEFAULT_ACTIVE_BATCH_SIZE: u64 = 1_000;

/// The number of log trigger upkeeps whose config is synced at once.
pub const DEFAULT_TRIGGER_CONFIG_BATCH_SIZE: usize = 32;

/// The age in blocks after which a check block is too old to be checked.
pub const DEFAULT_BLOCK_AGE_THRESHOLD: u64 = 500;

/// The number of blocks re-polled below the last polled block.
pub const DEFAULT_LOOKBACK_BLOCKS: u64 = 250;

/// The age in blocks after which a processed lifecycle log is forgotten.
pub const DEFAULT_PROCESSED_LOG_RETENTION: u64 = 5_000;

/// The capacity of the lifecycle log channel.
pub const DEFAULT_LOG_CHANNEL_SIZE: usize = 1_000;

/// The configuration of the [`EvmRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// The address of the registry contract.
    pub address: Address,
    /// The interval between two full refreshes of the active upkeeps.
    pub refresh_interval: Duration,
    /// The interval between two polls of the lifecycle logs.
    pub poll_interval: Duration,
    /// The number of active upkeep ids read per contract call.
    pub active_batch_size: u64,
    /// The number of log trigger upkeeps whose config is synced at once.
    pub trigger_config_batch_size: usize,
    /// The age in blocks after which a check block is too old.
    pub block_age_threshold: u64,
    /// The number of blocks re-polled below the last polled block.
    pub lookback_blocks: u64,
    /// The age in blocks after which a processed lifecycle log is forgotten.
    pub processed_log_retention: u64,
    /// The capacity of the lifecycle log channel.
    pub log_channel_size: usize,
}

impl RegistryConfig {
    /// Returns a new [`RegistryConfig`] for the registry with the default settings.
    pub const fn new(address: Address) -> Self {
        Self {
            address,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            active_batch_size: DEFAULT_ACTIVE_BATCH_SIZE,
            trigger_config_batch_size: DEFAULT_TRIGGER_CONFIG_BATCH_SIZE,
            block_age_threshold: DEFAULT_BLOCK_AGE_THRESHOLD,
            lookback_blocks: DEFAULT_LOOKBACK_BLOCKS,
            processed_log_retention: DEFAULT_PROCESSED_LOG_RETENTION,
            log_channel_size: DEFAULT_LOG_CHANNEL_SIZE,
        }
    }
}

/// Returns the name of the lifecycle filter of the registry.
pub fn lifecycle_filter_name(address: &Address) -> String {
    format!("EvmRegistry - Upkeep events for {address}")
}

/// Follows the lifecycle of the upkeeps of a registry and checks them.
#[derive(Debug)]
pub struct EvmRegistry<L, C, B, U, H> {
    config: RegistryConfig,
    log_index: L,
    client: C,
    blocks: B,
    state: U,
    streams: Streams<C, H>,
    active: Arc<ActiveUpkeepList>,
    log_provider: Arc<LogEventProvider<L>>,
    /// The processed lifecycle logs, keyed by transaction hash and log index, with their block.
    processed: Mutex<HashMap<(B256, u64), u64>>,
    last_poll_block: AtomicU64,
    started: AtomicBool,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    metrics: RegistryMetrics,
}

impl<L, C, B, U, H> EvmRegistry<L, C, B, U, H>
where
    L: LogIndex + 'static,
    C: ChainClient + 'static,
    B: BlockSource + 'static,
    U: UpkeepStateUpdater + 'static,
    H: HttpClient + 'static,
{
    /// Returns a new stopped [`EvmRegistry`].
    pub fn new(
        config: RegistryConfig,
        log_index: L,
        client: C,
        blocks: B,
        state: U,
        streams: Streams<C, H>,
        log_provider: Arc<LogEventProvider<L>>,
    ) -> Self {
        Self {
            config,
            log_index,
            client,
            blocks,
            state,
            streams,
            active: Arc::new(ActiveUpkeepList::new()),
            log_provider,
            processed: Mutex::new(HashMap::new()),
            last_poll_block: AtomicU64::new(0),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            metrics: RegistryMetrics::default(),
        }
    }

    /// Returns the active upkeeps.
    pub fn active(&self) -> Arc<ActiveUpkeepList> {
        self.active.clone()
    }

    /// Returns the log event provider of the log trigger upkeeps.
    pub fn log_provider(&self) -> Arc<LogEventProvider<L>> {
        self.log_provider.clone()
    }

    /// Registers the lifecycle filter, then spawns the refresh, poll and process tasks.
    pub async fn start(self: &Arc<Self>) -> Result<(), RegistryError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RegistryError::AlreadyStarted);
        }
        let filter = LogFilter {
            name: lifecycle_filter_name(&self.config.address),
            addresses: vec![self.config.address],
            event_sigs: LifecycleEvent::SIGNATURES.to_vec(),
            retention: None,
        };
        if let Err(err) = self.log_index.register_filter(filter).await {
            self.started.store(false, Ordering::SeqCst);
            return Err(err.into());
        }

        let (tx, rx) = mpsc::channel(self.config.log_channel_size);
        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(self.clone().run_refresh()));
        tasks.push(tokio::spawn(self.clone().run_poll(tx)));
        tasks.push(tokio::spawn(self.clone().run_process(rx)));
        tracing::info!(target: "automation::registry", address = %self.config.address, "started registry");
        Ok(())
    }

    /// Stops the background tasks and waits for them to exit.
    pub async fn close(&self) {
        self.cancel.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
    }

    async fn run_refresh(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.refresh_interval);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {
                    let refresh = self.refresh_active_upkeeps();
                    match tokio::time::timeout(self.config.refresh_interval, refresh).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            self.metrics.refresh_failures.increment(1);
                            tracing::error!(target: "automation::registry", ?err, "failed to refresh active upkeeps");
                        }
                        Err(_) => {
                            self.metrics.refresh_failures.increment(1);
                            tracing::error!(target: "automation::registry", "active upkeeps refresh timed out");
                        }
                    }
                }
            }
        }
    }

    async fn run_poll(self: Arc<Self>, tx: mpsc::Sender<Log>) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {
                    let logs = match self.poll_upkeep_events().await {
                        Ok(logs) => logs,
                        Err(err) => {
                            tracing::error!(target: "automation::registry", ?err, "failed to poll lifecycle logs");
                            continue
                        }
                    };
                    for log in logs {
                        if tx.send(log).await.is_err() {
                            return
                        }
                    }
                }
            }
        }
    }

    async fn run_process(self: Arc<Self>, mut rx: mpsc::Receiver<Log>) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                log = rx.recv() => {
                    let Some(log) = log else { break };
                    self.process_upkeep_log(&log).await;
                }
            }
        }
    }

    /// Reads the full set of active upkeeps from the contract, resets the active list and syncs
    /// the filters of the log trigger upkeeps.
    #[tracing::instrument(target = "automation::registry", skip_all)]
    pub async fn refresh_active_upkeeps(&self) -> Result<(), RegistryError> {
        let ids = self.fetch_active_upkeep_ids().await?;
        self.active.reset(&ids);
        self.metrics.active_upkeeps.set(ids.len() as f64);

        for id in self.log_provider.upkeep_ids() {
            if self.active.is_active(&id) {
                continue
            }
            if let Err(err) = self.log_provider.unregister_filter(id).await {
                tracing::warn!(target: "automation::registry", upkeep_id = %id, ?err, "failed to unregister inactive upkeep filter");
            }
        }

        let log_ids: Vec<_> =
            ids.iter().copied().filter(|id| id.upkeep_type() == UpkeepType::LogTrigger).collect();
        for batch in log_ids.chunks(self.config.trigger_config_batch_size.max(1)) {
            self.sync_trigger_configs(batch).await?;
        }
        tracing::debug!(target: "automation::registry", active = ids.len(), log_triggers = log_ids.len(), "refreshed active upkeeps");
        Ok(())
    }

    /// Pages through the active upkeep ids of the contract until a short page.
    async fn fetch_active_upkeep_ids(&self) -> Result<Vec<UpkeepId>, RegistryError> {
        let batch = self.config.active_batch_size.max(1);
        let mut ids = Vec::new();
        let mut start = 0u64;
        loop {
            let call = IAutomationRegistry::getActiveUpkeepIDsCall {
                startIndex: U256::from(start),
                maxCount: U256::from(batch),
            };
            let raw =
                self.client.call(CallRequest::latest(self.config.address, call.abi_encode())).await?;
            let page = IAutomationRegistry::getActiveUpkeepIDsCall::abi_decode_returns(&raw)?;
            let len = page.len() as u64;
            ids.extend(page.into_iter().map(UpkeepId::from));
            if len < batch {
                break
            }
            start += batch;
        }
        Ok(ids)
    }

    /// Syncs the filters of the log trigger upkeeps from their latest config event, reading
    /// the config from the contract when the latest event carries none.
    async fn sync_trigger_configs(&self, ids: &[UpkeepId]) -> Result<(), RegistryError> {
        let words: Vec<_> = ids.iter().map(UpkeepId::as_word).collect();
        let address = self.config.address;
        let config_logs = self
            .log_index
            .indexed_logs(UpkeepTriggerConfigSet::SIGNATURE_HASH, address, 1, &words, 1)
            .await?;
        let unpaused_logs = self
            .log_index
            .indexed_logs(UpkeepUnpaused::SIGNATURE_HASH, address, 1, &words, 1)
            .await?;

        // upkeep id -> ((block, log index), config)
        let mut latest: HashMap<UpkeepId, ((u64, u64), Option<Bytes>)> = HashMap::new();
        let decoded = config_logs
            .iter()
            .filter_map(|log| {
                let event = try_decode_log::<UpkeepTriggerConfigSet>(&log.inner)?;
                Some((log, UpkeepId::from(event.data.id), Some(event.data.triggerConfig)))
            })
            .chain(unpaused_logs.iter().filter_map(|log| {
                let event = try_decode_log::<UpkeepUnpaused>(&log.inner)?;
                Some((log, UpkeepId::from(event.data.id), None))
            }));
        for (log, id, config) in decoded {
            let position =
                (log.block_number.unwrap_or_default(), log.log_index.unwrap_or_default());
            match latest.get(&id) {
                Some((current, _)) if *current >= position => {}
                _ => {
                    latest.insert(id, (position, config));
                }
            }
        }

        for id in ids {
            let ((block, _), config) = latest.remove(id).unwrap_or_default();
            self.update_trigger_config(*id, config, block).await;
        }
        Ok(())
    }

    /// Reads the trigger config of the upkeep from the contract.
    async fn read_trigger_config(&self, id: UpkeepId) -> Result<Bytes, RegistryError> {
        let call = IAutomationRegistry::getUpkeepTriggerConfigCall { upkeepId: id.0 };
        let raw =
            self.client.call(CallRequest::latest(self.config.address, call.abi_encode())).await?;
        Ok(IAutomationRegistry::getUpkeepTriggerConfigCall::abi_decode_returns(&raw)?)
    }

    /// Installs or refreshes the filter of a log trigger upkeep. The config is read from the
    /// contract if not provided. Failures are logged and skipped.
    async fn update_trigger_config(&self, id: UpkeepId, config: Option<Bytes>, block: u64) {
        if id.upkeep_type() != UpkeepType::LogTrigger {
            return
        }
        let raw = match config {
            Some(config) => config,
            None => match self.read_trigger_config(id).await {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!(target: "automation::registry", upkeep_id = %id, ?err, "failed to read trigger config");
                    return
                }
            },
        };
        if raw.is_empty() {
            tracing::warn!(target: "automation::registry", upkeep_id = %id, "trigger config not found");
            return
        }
        let config = match unpack_log_trigger_config(&raw) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(target: "automation::registry", upkeep_id = %id, ?err, "invalid trigger config");
                return
            }
        };
        match self.log_provider.refresh_filter(id, config, block).await {
            Ok(true) => {
                tracing::debug!(target: "automation::registry", upkeep_id = %id, block, "updated log trigger filter");
            }
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(target: "automation::registry", upkeep_id = %id, ?err, "failed to update log trigger filter");
            }
        }
    }

    /// Returns the lifecycle logs emitted since the last poll. The first poll only records the
    /// latest block.
    pub async fn poll_upkeep_events(&self) -> Result<Vec<Log>, RegistryError> {
        let latest = self.log_index.latest_block().await?;
        let last = self.last_poll_block.load(Ordering::Relaxed);
        if last == 0 {
            self.last_poll_block.store(latest, Ordering::Relaxed);
            return Ok(Vec::new());
        }
        if latest <= last {
            return Ok(Vec::new());
        }

        let start = last.saturating_sub(self.config.lookback_blocks);
        let logs = self
            .log_index
            .logs_with_sigs(start, latest, &LifecycleEvent::SIGNATURES, self.config.address)
            .await?;
        self.last_poll_block.store(latest, Ordering::Relaxed);

        let horizon = latest.saturating_sub(self.config.processed_log_retention);
        self.processed.lock().retain(|_, block| *block >= horizon);
        tracing::trace!(target: "automation::registry", start, latest, logs = logs.len(), "polled lifecycle logs");
        Ok(logs)
    }

    /// Applies the lifecycle log to the active list and the log trigger filters. Logs already
    /// processed are ignored.
    pub async fn process_upkeep_log(&self, log: &Log) {
        let (Some(tx_hash), Some(log_index)) = (log.transaction_hash, log.log_index) else {
            return
        };
        let block = log.block_number.unwrap_or_default();
        if self.processed.lock().insert((tx_hash, log_index), block).is_some() {
            tracing::trace!(target: "automation::registry", %tx_hash, log_index, "skipping processed log");
            return
        }
        let Some(event) = LifecycleEvent::decode(&log.inner) else { return };
        self.metrics.processed_logs.increment(1);
        tracing::debug!(target: "automation::registry", ?event, block, "processing lifecycle event");

        match event {
            LifecycleEvent::Registered(id) |
            LifecycleEvent::Received(id) |
            LifecycleEvent::Unpaused(id) => {
                self.active.add(&[id]);
                self.update_trigger_config(id, None, block).await;
            }
            LifecycleEvent::TriggerConfigSet { upkeep_id, config } => {
                self.update_trigger_config(upkeep_id, Some(config), block).await;
            }
            LifecycleEvent::Paused(id) | LifecycleEvent::Canceled(id) | LifecycleEvent::Migrated(id) => {
                self.active.remove(&[id]);
                if self.log_provider.has_filter(&id) {
                    if let Err(err) = self.log_provider.unregister_filter(id).await {
                        tracing::warn!(target: "automation::registry", upkeep_id = %id, ?err, "failed to unregister upkeep filter");
                    }
                }
            }
        }
    }
}
