use crate::UpkeepStateError;

use alloy_primitives::Address;
use alloy_sol_types::SolEvent;
use automation_abi::DedupKeyAdded;
use automation_primitives::WorkId;
use automation_providers::{LogFilter, LogIndex};
use std::time::Duration;

/// The number of work ids looked up per log index query.
pub const DEFAULT_SCAN_BATCH_SIZE: usize = 100;

/// Finds the performed work ids from the dedup keys the registry emits on perform.
#[derive(Debug)]
pub struct PerformedLogsScanner<L> {
    log_index: L,
    registry: Address,
    retention: Duration,
    batch_size: usize,
    confirmations: u64,
}

impl<L: LogIndex> PerformedLogsScanner<L> {
    /// Returns a new [`PerformedLogsScanner`] over the logs of the registry.
    pub fn new(log_index: L, registry: Address, retention: Duration) -> Self {
        Self {
            log_index,
            registry,
            retention,
            batch_size: DEFAULT_SCAN_BATCH_SIZE,
            confirmations: 1,
        }
    }

    /// Returns the name of the log index filter of the scanner.
    pub fn filter_name(&self) -> String {
        format!("KeepersRegistry UpkeepStates Logs Filter:{}", self.registry)
    }

    /// Installs the dedup key filter with the log index.
    pub async fn start(&self) -> Result<(), UpkeepStateError> {
        self.log_index
            .register_filter(LogFilter {
                name: self.filter_name(),
                addresses: vec![self.registry],
                event_sigs: vec![DedupKeyAdded::SIGNATURE_HASH],
                retention: Some(self.retention),
            })
            .await?;
        Ok(())
    }

    /// Removes the dedup key filter from the log index.
    pub async fn close(&self) -> Result<(), UpkeepStateError> {
        self.log_index.unregister_filter(&self.filter_name()).await?;
        Ok(())
    }

    /// Returns the performed work ids among the provided ones, with the block of their dedup key.
    pub async fn scan_work_ids(
        &self,
        work_ids: &[WorkId],
    ) -> Result<Vec<(WorkId, u64)>, UpkeepStateError> {
        let mut performed = Vec::new();
        for batch in work_ids.chunks(self.batch_size.max(1)) {
            let values: Vec<_> = batch.iter().map(|id| id.0).collect();
            let logs = self
                .log_index
                .indexed_logs(
                    DedupKeyAdded::SIGNATURE_HASH,
                    self.registry,
                    1,
                    &values,
                    self.confirmations,
                )
                .await?;
            performed.extend(logs.iter().filter_map(|log| {
                let key = log.topics().get(1)?;
                Some((WorkId(*key), log.block_number.unwrap_or_default()))
            }));
        }
        tracing::trace!(target: "automation::upkeepstate", scanned = work_ids.len(), performed = performed.len(), "scanned dedup keys");
        Ok(performed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use automation_providers::test_utils::{mined_log, MockLogIndex};

    #[tokio::test]
    async fn test_should_scan_dedup_keys_in_batches() -> eyre::Result<()> {
        // Given
        let registry = Address::repeat_byte(0x11);
        let index = MockLogIndex::new();
        let keys: Vec<_> = (1..=5u8).map(B256::repeat_byte).collect();
        index.add_logs(keys.iter().enumerate().map(|(i, key)| {
            mined_log(registry, vec![DedupKeyAdded::SIGNATURE_HASH, *key], 10 + i as u64, 0)
        }));
        index.set_latest_block(20);
        let mut scanner = PerformedLogsScanner::new(index.clone(), registry, Duration::from_secs(60));
        scanner.batch_size = 2;
        scanner.start().await?;

        // When
        let lookup: Vec<_> = keys.iter().take(3).map(|k| WorkId(*k)).chain([WorkId(B256::ZERO)]).collect();
        let performed = scanner.scan_work_ids(&lookup).await?;

        // Then
        assert_eq!(performed, vec![(WorkId(keys[0]), 10), (WorkId(keys[1]), 11), (WorkId(keys[2]), 12)]);
        assert_eq!(index.log_queries(), 2);
        assert!(index.filters().contains_key(&scanner.filter_name()));
        Ok(())
    }
}
