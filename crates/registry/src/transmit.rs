use crate::RegistryError;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rpc_types_eth::Log;
use alloy_sol_types::SolEvent;
use automation_abi::{
    try_decode_log, unpack_trigger, InsufficientFundsUpkeepReport, ReorgedUpkeepReport,
    StaleUpkeepReport, UpkeepPerformed,
};
use automation_primitives::{TransmitEvent, TransmitEventType, UpkeepId, WorkId};
use automation_providers::{LogFilter, LogIndex};

/// The number of blocks below the latest block the transmit events are read from.
pub const DEFAULT_TRANSMIT_LOOKBACK_BLOCKS: u64 = 250;

/// The signatures of the transmit events.
const TRANSMIT_EVENT_SIGNATURES: [B256; 4] = [
    UpkeepPerformed::SIGNATURE_HASH,
    StaleUpkeepReport::SIGNATURE_HASH,
    ReorgedUpkeepReport::SIGNATURE_HASH,
    InsufficientFundsUpkeepReport::SIGNATURE_HASH,
];

/// Returns the kind, upkeep and packed trigger of a transmit log.
fn decode_transmit_log(log: &alloy_primitives::Log) -> Option<(TransmitEventType, U256, Bytes)> {
    if let Some(l) = try_decode_log::<UpkeepPerformed>(log) {
        return Some((TransmitEventType::Performed, l.data.id, l.data.trigger));
    }
    if let Some(l) = try_decode_log::<StaleUpkeepReport>(log) {
        return Some((TransmitEventType::StaleReport, l.data.id, l.data.trigger));
    }
    if let Some(l) = try_decode_log::<ReorgedUpkeepReport>(log) {
        return Some((TransmitEventType::ReorgReport, l.data.id, l.data.trigger));
    }
    try_decode_log::<InsufficientFundsUpkeepReport>(log)
        .map(|l| (TransmitEventType::InsufficientFundsReport, l.data.id, l.data.trigger))
}

/// Reads the outcome of the transmitted reports from the registry logs.
#[derive(Debug)]
pub struct TransmitEventProvider<L> {
    log_index: L,
    registry: Address,
    lookback_blocks: u64,
}

impl<L: LogIndex> TransmitEventProvider<L> {
    /// Returns a new [`TransmitEventProvider`] for the registry.
    pub const fn new(log_index: L, registry: Address, lookback_blocks: u64) -> Self {
        Self { log_index, registry, lookback_blocks }
    }

    /// Returns the name of the transmit events filter.
    pub fn filter_name(&self) -> String {
        format!("KeeperRegistry Events - {}", self.registry)
    }

    /// Registers the transmit events filter with the log index.
    pub async fn start(&self) -> Result<(), RegistryError> {
        let filter = LogFilter {
            name: self.filter_name(),
            addresses: vec![self.registry],
            event_sigs: TRANSMIT_EVENT_SIGNATURES.to_vec(),
            retention: None,
        };
        Ok(self.log_index.register_filter(filter).await?)
    }

    /// Returns the transmit events of the lookback window, oldest first.
    pub async fn get_latest_events(&self) -> Result<Vec<TransmitEvent>, RegistryError> {
        let latest = self.log_index.latest_block().await?;
        let start = latest.saturating_sub(self.lookback_blocks);
        let logs = self
            .log_index
            .logs_with_sigs(start, latest, &TRANSMIT_EVENT_SIGNATURES, self.registry)
            .await?;

        Ok(logs.iter().filter_map(|log| self.transmit_event(log, latest)).collect())
    }

    fn transmit_event(&self, log: &Log, latest: u64) -> Option<TransmitEvent> {
        let (event_type, id, raw_trigger) = decode_transmit_log(&log.inner)?;
        let upkeep_id = UpkeepId::from(id);
        let trigger = match unpack_trigger(&upkeep_id, &raw_trigger) {
            Ok(trigger) => trigger,
            Err(err) => {
                tracing::debug!(target: "automation::registry", %upkeep_id, ?err, "skipping transmit event with invalid trigger");
                return None;
            }
        };
        let transmit_block = log.block_number?;

        Some(TransmitEvent {
            event_type,
            transmit_block,
            confirmations: latest.saturating_sub(transmit_block),
            transaction_hash: log.transaction_hash.unwrap_or_default(),
            work_id: WorkId::new(&upkeep_id, &trigger),
            upkeep_id,
            check_block: trigger.block_number,
        })
    }
}
