use crate::ProviderError;

use alloy_primitives::{Address, B256};
use alloy_rpc_types_eth::Log;
use automation_primitives::BlockInfo;
use std::time::Duration;

/// A filter installed with the [`LogIndex`], which makes the index retain matching logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    /// The unique name of the filter.
    pub name: String,
    /// The addresses emitting the logs.
    pub addresses: Vec<Address>,
    /// The event signatures of the logs.
    pub event_sigs: Vec<B256>,
    /// How long matching logs are retained, forever if unset.
    pub retention: Option<Duration>,
}

/// An append only index of event logs, which may be affected by reorgs.
#[async_trait::async_trait]
#[auto_impl::auto_impl(Arc)]
pub trait LogIndex: Send + Sync {
    /// Installs the filter. Registering an existing name replaces the filter.
    async fn register_filter(&self, filter: LogFilter) -> Result<(), ProviderError>;

    /// Removes the filter with the provided name.
    async fn unregister_filter(&self, name: &str) -> Result<(), ProviderError>;

    /// Returns the latest block indexed.
    async fn latest_block(&self) -> Result<u64, ProviderError>;

    /// Returns the logs emitted by the address in the inclusive block range, with any of the
    /// provided event signatures.
    async fn logs_with_sigs(
        &self,
        start: u64,
        end: u64,
        event_sigs: &[B256],
        address: Address,
    ) -> Result<Vec<Log>, ProviderError>;

    /// Returns the logs with the event signature emitted by the address, which have the topic at
    /// `topic_index` equal to one of the values and at least `confirmations` blocks on top.
    async fn indexed_logs(
        &self,
        event_sig: B256,
        address: Address,
        topic_index: usize,
        values: &[B256],
        confirmations: u64,
    ) -> Result<Vec<Log>, ProviderError>;

    /// Returns the blocks with the provided numbers known to the index.
    async fn get_blocks_range(&self, numbers: &[u64]) -> Result<Vec<BlockInfo>, ProviderError>;
}
