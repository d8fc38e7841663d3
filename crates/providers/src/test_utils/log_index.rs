use crate::{LogFilter, LogIndex, ProviderError};

use alloy_primitives::{Address, B256};
use alloy_rpc_types_eth::Log;
use automation_primitives::BlockInfo;
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

/// An in memory [`LogIndex`].
#[derive(Debug, Default, Clone)]
pub struct MockLogIndex {
    filters: Arc<Mutex<HashMap<String, LogFilter>>>,
    logs: Arc<Mutex<Vec<Log>>>,
    blocks: Arc<Mutex<BTreeMap<u64, B256>>>,
    latest: Arc<Mutex<u64>>,
    failing: Arc<Mutex<bool>>,
    log_queries: Arc<AtomicUsize>,
}

impl MockLogIndex {
    /// Returns a new empty [`MockLogIndex`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the latest block of the index.
    pub fn set_latest_block(&self, number: u64) {
        *self.latest.lock() = number;
    }

    /// Appends the logs to the index.
    pub fn add_logs(&self, logs: impl IntoIterator<Item = Log>) {
        self.logs.lock().extend(logs);
    }

    /// Sets the hash of the block at the provided number.
    pub fn set_block(&self, number: u64, hash: B256) {
        self.blocks.lock().insert(number, hash);
    }

    /// Makes every subsequent call fail when set.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    /// Returns the registered filters.
    pub fn filters(&self) -> HashMap<String, LogFilter> {
        self.filters.lock().clone()
    }

    /// Returns the number of log queries served.
    pub fn log_queries(&self) -> usize {
        self.log_queries.load(Ordering::Relaxed)
    }

    fn check_failing(&self) -> Result<(), ProviderError> {
        if *self.failing.lock() {
            return Err(ProviderError::Other("mock log index failure".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl LogIndex for MockLogIndex {
    async fn register_filter(&self, filter: LogFilter) -> Result<(), ProviderError> {
        self.check_failing()?;
        self.filters.lock().insert(filter.name.clone(), filter);
        Ok(())
    }

    async fn unregister_filter(&self, name: &str) -> Result<(), ProviderError> {
        self.check_failing()?;
        self.filters
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ProviderError::FilterNotFound(name.to_string()))
    }

    async fn latest_block(&self) -> Result<u64, ProviderError> {
        self.check_failing()?;
        Ok(*self.latest.lock())
    }

    async fn logs_with_sigs(
        &self,
        start: u64,
        end: u64,
        event_sigs: &[B256],
        address: Address,
    ) -> Result<Vec<Log>, ProviderError> {
        self.check_failing()?;
        self.log_queries.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .logs
            .lock()
            .iter()
            .filter(|log| {
                let number = log.block_number.unwrap_or_default();
                (start..=end).contains(&number) &&
                    log.address() == address &&
                    log.topic0().is_some_and(|sig| event_sigs.contains(sig))
            })
            .cloned()
            .collect())
    }

    async fn indexed_logs(
        &self,
        event_sig: B256,
        address: Address,
        topic_index: usize,
        values: &[B256],
        confirmations: u64,
    ) -> Result<Vec<Log>, ProviderError> {
        self.check_failing()?;
        self.log_queries.fetch_add(1, Ordering::Relaxed);
        let latest = *self.latest.lock();
        Ok(self
            .logs
            .lock()
            .iter()
            .filter(|log| {
                let number = log.block_number.unwrap_or_default();
                number + confirmations <= latest + 1 &&
                    log.address() == address &&
                    log.topic0() == Some(&event_sig) &&
                    log.topics().get(topic_index).is_some_and(|topic| values.contains(topic))
            })
            .cloned()
            .collect())
    }

    async fn get_blocks_range(&self, numbers: &[u64]) -> Result<Vec<BlockInfo>, ProviderError> {
        self.check_failing()?;
        let blocks = self.blocks.lock();
        Ok(numbers
            .iter()
            .filter_map(|n| blocks.get(n).map(|hash| BlockInfo::new(*n, *hash)))
            .collect())
    }
}
