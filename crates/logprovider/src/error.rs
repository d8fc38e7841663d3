use alloy_primitives::B256;
use automation_abi::AbiError;
use automation_primitives::{UpkeepId, WorkId};
use automation_providers::ProviderError;
use automation_upkeepstate::UpkeepStateError;

/// The error type for the log event provider.
#[derive(Debug, thiserror::Error)]
pub enum LogProviderError {
    /// The trigger config of the upkeep is not usable.
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    /// A filter is already registered for the upkeep.
    #[error("filter for upkeep {0} already registered")]
    DuplicateFilter(UpkeepId),
    /// No filter is registered for the upkeep.
    #[error("filter for upkeep {0} not found")]
    FilterNotFound(UpkeepId),
    /// The trigger does not point at a mined log.
    #[error("trigger of upkeep {0} does not identify a log")]
    InvalidTrigger(UpkeepId),
    /// The log the trigger points at is not indexed.
    #[error("log of upkeep {0} not found")]
    LogNotFound(UpkeepId),
    /// The upkeep is not a log trigger upkeep.
    #[error("upkeep {0} is not a log trigger upkeep")]
    NotLogTrigger(UpkeepId),
    /// The transaction of the log is not mined.
    #[error("failed to get block of transaction {0}")]
    TxBlockNotFound(B256),
    /// The transaction of the log was reorged into another block.
    #[error("transaction {0} of the log was reorged")]
    LogReorged(B256),
    /// The log block is outside of the recovery window.
    #[error("log block {0} is not recoverable")]
    NotRecoverable(u64),
    /// The work was already performed or found ineligible.
    #[error("state of work {0} is not recoverable")]
    StateNotRecoverable(WorkId),
    /// The upkeep already has the maximum number of pending payloads.
    #[error("too many pending payloads for upkeep {0}")]
    PendingLimit(UpkeepId),
    /// A call to the upkeep state store failed.
    #[error(transparent)]
    State(#[from] UpkeepStateError),
    /// A call to the log index failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// The log could not be packed.
    #[error(transparent)]
    Abi(#[from] AbiError),
}
