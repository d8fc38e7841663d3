//! Upkeep state store for the automation node.
//!
//! Terminal states of units of work are resolved from three tiers: an in memory cache, the
//! dedup keys the registry emits when work is performed, and a durable store of ineligible
//! states. Only ineligible states are ever written, performed states are always recovered from
//! the chain.

mod buckets;
pub use buckets::TokenBuckets;

mod error;
pub use error::UpkeepStateError;

mod metrics;
use metrics::UpkeepStateMetrics;

mod orm;
pub use orm::{DatabaseOrm, UpkeepStateOrm};

mod scanner;
pub use scanner::{PerformedLogsScanner, DEFAULT_SCAN_BATCH_SIZE};

#[cfg(any(test, feature = "test-utils"))]
/// Common test helpers
pub mod test_utils;

use alloy_primitives::Address;
use automation_primitives::{
    CheckResult, UpkeepFailureReason, UpkeepId, UpkeepState, UpkeepStateRecord, WorkId,
};
use automation_providers::LogIndex;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::{sync::Semaphore, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// The time a state is retained for.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// The interval between two sweeps of the expired states.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(2 * 60 * 60);

/// The interval between two flushes of the pending states.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// The number of states inserted per batch.
pub const DEFAULT_FLUSH_BATCH_SIZE: usize = 1000;

/// The number of batch inserts running at the same time.
pub const DEFAULT_CONCURRENT_FLUSHES: usize = 10;

/// The number of scanner lookups allowed per work id between two sweeps.
pub const DEFAULT_SCANS_PER_WORK_ID: u32 = 100;

/// The configuration of the [`UpkeepStateStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpkeepStateConfig {
    /// The registry emitting the dedup keys.
    pub registry: Address,
    /// The time a state is retained for.
    pub cache_ttl: Duration,
    /// The interval between two sweeps of the expired states.
    pub cleanup_interval: Duration,
    /// The interval between two flushes of the pending states.
    pub flush_interval: Duration,
    /// The number of states inserted per batch.
    pub flush_batch_size: usize,
    /// The number of batch inserts running at the same time.
    pub concurrent_flushes: usize,
    /// The number of scanner lookups allowed per work id between two sweeps.
    pub scans_per_work_id: u32,
}

impl UpkeepStateConfig {
    /// Returns the default configuration for the registry.
    pub const fn new(registry: Address) -> Self {
        Self {
            registry,
            cache_ttl: DEFAULT_CACHE_TTL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            flush_batch_size: DEFAULT_FLUSH_BATCH_SIZE,
            concurrent_flushes: DEFAULT_CONCURRENT_FLUSHES,
            scans_per_work_id: DEFAULT_SCANS_PER_WORK_ID,
        }
    }
}

/// Records the terminal states the registry determines.
#[async_trait::async_trait]
#[auto_impl::auto_impl(Arc)]
pub trait UpkeepStateUpdater: Send + Sync {
    /// Records the state of the checked work.
    async fn update_upkeep_state(
        &self,
        result: &CheckResult,
        state: UpkeepState,
    ) -> Result<(), UpkeepStateError>;
}

/// Reads the terminal states of units of work.
#[async_trait::async_trait]
#[auto_impl::auto_impl(Arc)]
pub trait UpkeepStateReader: Send + Sync {
    /// Returns the state of each work id, in order.
    async fn select_by_work_ids(
        &self,
        work_ids: &[WorkId],
    ) -> Result<Vec<UpkeepState>, UpkeepStateError>;
}

/// Returns the current unix timestamp in milliseconds.
fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or_default()
}

/// A write behind cache of the terminal states of units of work.
#[derive(Debug)]
pub struct UpkeepStateStore<L, O> {
    scanner: PerformedLogsScanner<L>,
    orm: Arc<O>,
    config: UpkeepStateConfig,
    cache: parking_lot::RwLock<HashMap<WorkId, UpkeepStateRecord>>,
    pending: Mutex<Vec<UpkeepStateRecord>>,
    buckets: TokenBuckets,
    flush_permits: Arc<Semaphore>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    metrics: UpkeepStateMetrics,
}

impl<L, O> UpkeepStateStore<L, O>
where
    L: LogIndex + 'static,
    O: UpkeepStateOrm + 'static,
{
    /// Returns a new stopped [`UpkeepStateStore`].
    pub fn new(log_index: L, orm: O, config: UpkeepStateConfig) -> Self {
        Self {
            scanner: PerformedLogsScanner::new(log_index, config.registry, config.cache_ttl),
            orm: Arc::new(orm),
            config,
            cache: parking_lot::RwLock::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
            buckets: TokenBuckets::new(config.scans_per_work_id),
            flush_permits: Arc::new(Semaphore::new(config.concurrent_flushes.max(1))),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            metrics: UpkeepStateMetrics::default(),
        }
    }

    /// Installs the dedup key filter and spawns the cleanup and flush loop.
    pub async fn start(self: &Arc<Self>) -> Result<(), UpkeepStateError> {
        if self.task.lock().is_some() {
            return Err(UpkeepStateError::AlreadyStarted);
        }
        self.scanner.start().await?;

        let handle = tokio::spawn(self.clone().run());
        *self.task.lock() = Some(handle);
        tracing::info!(target: "automation::upkeepstate", registry = ?self.config.registry, "upkeep state store started");
        Ok(())
    }

    /// Stops the background loop, waiting for the final flush of the pending states, then
    /// removes the dedup key filter.
    pub async fn close(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!(target: "automation::upkeepstate", ?err, "upkeep state loop failed");
            }
        }
        if let Err(err) = self.scanner.close().await {
            tracing::warn!(target: "automation::upkeepstate", ?err, "failed to remove dedup key filter");
        }
        tracing::info!(target: "automation::upkeepstate", "upkeep state store closed");
    }

    async fn run(self: Arc<Self>) {
        let mut cleanup = tokio::time::interval(self.config.cleanup_interval);
        let mut flush = tokio::time::interval(self.config.flush_interval);
        // the first ticks complete immediately.
        cleanup.tick().await;
        flush.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    for handle in self.flush() {
                        let _ = handle.await;
                    }
                    break;
                }
                _ = cleanup.tick() => self.cleanup().await,
                _ = flush.tick() => {
                    let _ = self.flush();
                }
            }
        }
    }

    /// Records the state of the checked work. Only ineligible states of ineligible results are
    /// recorded, every other write is a no op.
    pub fn set_upkeep_state(&self, result: &CheckResult, state: UpkeepState) {
        if result.eligible || state != UpkeepState::Ineligible {
            return;
        }

        let record = UpkeepStateRecord {
            work_id: result.work_id,
            upkeep_id: result.upkeep_id,
            state,
            block_number: result.trigger.block_number,
            ineligibility_reason: result.ineligibility_reason,
            inserted_at: now_millis(),
        };
        let size = {
            let mut cache = self.cache.write();
            cache.insert(record.work_id, record);
            cache.len()
        };
        self.pending.lock().push(record);
        self.metrics.cache_size.set(size as f64);
        tracing::trace!(target: "automation::upkeepstate", work_id = %record.work_id, reason = ?record.ineligibility_reason, "recorded ineligible state");
    }

    /// Returns the state of each work id, in order. Work ids without any known state resolve
    /// to [`UpkeepState::Unknown`].
    pub async fn select_by_work_ids(
        &self,
        work_ids: &[WorkId],
    ) -> Result<Vec<UpkeepState>, UpkeepStateError> {
        let mut states = HashMap::with_capacity(work_ids.len());
        let mut misses = Vec::new();
        {
            let cache = self.cache.read();
            for id in work_ids {
                match cache.get(id) {
                    Some(record) => {
                        states.insert(*id, record.state);
                    }
                    None => misses.push(*id),
                }
            }
        }

        if !misses.is_empty() {
            self.fetch_performed(&mut states, &misses).await?;
            misses.retain(|id| !states.contains_key(id));
        }
        if !misses.is_empty() {
            self.fetch_from_db(&mut states, &misses).await?;
        }

        Ok(work_ids.iter().map(|id| states.get(id).copied().unwrap_or_default()).collect())
    }

    async fn fetch_performed(
        &self,
        states: &mut HashMap<WorkId, UpkeepState>,
        misses: &[WorkId],
    ) -> Result<(), UpkeepStateError> {
        let allowed: Vec<_> = misses
            .iter()
            .copied()
            .filter(|id| {
                let accepted = self.buckets.accept(&id.to_string(), 1);
                if !accepted {
                    self.metrics.throttled_scans.increment(1);
                }
                accepted
            })
            .collect();
        if allowed.is_empty() {
            return Ok(());
        }

        let performed = self.scanner.scan_work_ids(&allowed).await?;
        let now = now_millis();
        let mut cache = self.cache.write();
        for (work_id, block_number) in performed {
            cache.insert(
                work_id,
                UpkeepStateRecord {
                    work_id,
                    upkeep_id: UpkeepId::default(),
                    state: UpkeepState::Performed,
                    block_number,
                    ineligibility_reason: UpkeepFailureReason::None,
                    inserted_at: now,
                },
            );
            states.insert(work_id, UpkeepState::Performed);
        }
        self.metrics.cache_size.set(cache.len() as f64);
        Ok(())
    }

    async fn fetch_from_db(
        &self,
        states: &mut HashMap<WorkId, UpkeepState>,
        misses: &[WorkId],
    ) -> Result<(), UpkeepStateError> {
        let records = self.orm.select_upkeep_states(misses).await?;
        let mut cache = self.cache.write();
        for record in records {
            states.insert(record.work_id, record.state);
            cache.insert(record.work_id, record);
        }
        self.metrics.cache_size.set(cache.len() as f64);
        Ok(())
    }

    /// Evicts the expired states from the cache and the durable store, and refills the scanner
    /// token buckets.
    pub async fn cleanup(&self) {
        let ttl = self.config.cache_ttl.as_millis() as u64;
        let now = now_millis();
        let size = {
            let mut cache = self.cache.write();
            cache.retain(|_, record| record.inserted_at.saturating_add(ttl) >= now);
            cache.len()
        };
        self.metrics.cache_size.set(size as f64);

        match self.orm.delete_expired_upkeep_states(now.saturating_sub(ttl)).await {
            Ok(deleted) => {
                tracing::debug!(target: "automation::upkeepstate", cached = size, deleted, "cleaned up expired states");
            }
            Err(err) => {
                tracing::error!(target: "automation::upkeepstate", ?err, "failed to delete expired states");
            }
        }
        self.buckets.reset();
    }

    /// Drains the pending states into batch inserts, each holding a permit of the flush
    /// semaphore. Returns the handles of the spawned inserts.
    pub fn flush(&self) -> Vec<JoinHandle<()>> {
        let pending = std::mem::take(&mut *self.pending.lock());
        if pending.is_empty() {
            return vec![];
        }
        tracing::debug!(target: "automation::upkeepstate", count = pending.len(), "flushing pending states");

        pending
            .chunks(self.config.flush_batch_size.max(1))
            .map(|batch| {
                let batch = batch.to_vec();
                let orm = self.orm.clone();
                let permits = self.flush_permits.clone();
                let metrics = self.metrics.clone();
                tokio::spawn(async move {
                    let Ok(_permit) = permits.acquire_owned().await else { return };
                    let count = batch.len();
                    match orm.insert_upkeep_states(batch).await {
                        Ok(()) => metrics.flushed_records.increment(count as u64),
                        Err(err) => {
                            metrics.flush_failures.increment(1);
                            tracing::error!(target: "automation::upkeepstate", ?err, count, "failed to insert upkeep states");
                        }
                    }
                })
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl<L, O> UpkeepStateUpdater for UpkeepStateStore<L, O>
where
    L: LogIndex + 'static,
    O: UpkeepStateOrm + 'static,
{
    async fn update_upkeep_state(
        &self,
        result: &CheckResult,
        state: UpkeepState,
    ) -> Result<(), UpkeepStateError> {
        self.set_upkeep_state(result, state);
        Ok(())
    }
}

#[async_trait::async_trait]
impl<L, O> UpkeepStateReader for UpkeepStateStore<L, O>
where
    L: LogIndex + 'static,
    O: UpkeepStateOrm + 'static,
{
    async fn select_by_work_ids(
        &self,
        work_ids: &[WorkId],
    ) -> Result<Vec<UpkeepState>, UpkeepStateError> {
        Self::select_by_work_ids(self, work_ids).await
    }
}
