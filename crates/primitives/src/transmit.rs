use crate::{Trigger, UpkeepId, WorkId};

use alloy_primitives::{Bytes, B256};

/// The kind of a registry transmit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransmitEventType {
    /// The upkeep was performed.
    Performed,
    /// The report was stale by the time it landed.
    StaleReport,
    /// The report trigger was reorged.
    ReorgReport,
    /// The upkeep could not pay for the perform.
    InsufficientFundsReport,
}

/// A report outcome observed on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitEvent {
    /// The kind of the event.
    pub event_type: TransmitEventType,
    /// The block the report landed in.
    pub transmit_block: u64,
    /// The number of blocks on top of the transmit block.
    pub confirmations: u64,
    /// The hash of the transmit transaction.
    pub transaction_hash: B256,
    /// The work id of the reported upkeep.
    pub work_id: WorkId,
    /// The reported upkeep.
    pub upkeep_id: UpkeepId,
    /// The check block of the reported trigger.
    pub check_block: u64,
}

/// An upkeep included in a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedUpkeep {
    /// The upkeep.
    pub upkeep_id: UpkeepId,
    /// The trigger of the check.
    pub trigger: Trigger,
    /// The identifier of the work.
    pub work_id: WorkId,
    /// The data to perform the upkeep with.
    pub perform_data: Bytes,
}

/// A proposal agreed on by the network for an upkeep to be checked at a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatedBlockProposal {
    /// The upkeep.
    pub upkeep_id: UpkeepId,
    /// The trigger to check the upkeep at.
    pub trigger: Trigger,
    /// The identifier of the work.
    pub work_id: WorkId,
}
