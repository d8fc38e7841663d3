use alloy_primitives::{Bytes, Log, B256};
use alloy_sol_types::SolEvent;
use automation_abi::{
    try_decode_log, UpkeepCanceled, UpkeepMigrated, UpkeepPaused, UpkeepReceived,
    UpkeepRegistered, UpkeepTriggerConfigSet, UpkeepUnpaused,
};
use automation_primitives::UpkeepId;

/// A change to the lifecycle of an upkeep emitted by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The upkeep was registered.
    Registered(UpkeepId),
    /// The upkeep was migrated in from another registry.
    Received(UpkeepId),
    /// The upkeep was unpaused.
    Unpaused(UpkeepId),
    /// The upkeep was paused.
    Paused(UpkeepId),
    /// The upkeep was canceled.
    Canceled(UpkeepId),
    /// The upkeep was migrated out to another registry.
    Migrated(UpkeepId),
    /// The trigger config of the upkeep was set.
    TriggerConfigSet {
        /// The upkeep.
        upkeep_id: UpkeepId,
        /// The packed trigger config.
        config: Bytes,
    },
}

impl LifecycleEvent {
    /// The signatures of the lifecycle events.
    pub const SIGNATURES: [B256; 7] = [
        UpkeepRegistered::SIGNATURE_HASH,
        UpkeepReceived::SIGNATURE_HASH,
        UpkeepUnpaused::SIGNATURE_HASH,
        UpkeepPaused::SIGNATURE_HASH,
        UpkeepCanceled::SIGNATURE_HASH,
        UpkeepMigrated::SIGNATURE_HASH,
        UpkeepTriggerConfigSet::SIGNATURE_HASH,
    ];

    /// Decodes the log into a lifecycle event, if it is one.
    pub fn decode(log: &Log) -> Option<Self> {
        if let Some(l) = try_decode_log::<UpkeepRegistered>(log) {
            return Some(Self::Registered(l.data.id.into()));
        }
        if let Some(l) = try_decode_log::<UpkeepReceived>(log) {
            return Some(Self::Received(l.data.id.into()));
        }
        if let Some(l) = try_decode_log::<UpkeepUnpaused>(log) {
            return Some(Self::Unpaused(l.data.id.into()));
        }
        if let Some(l) = try_decode_log::<UpkeepPaused>(log) {
            return Some(Self::Paused(l.data.id.into()));
        }
        if let Some(l) = try_decode_log::<UpkeepCanceled>(log) {
            return Some(Self::Canceled(l.data.id.into()));
        }
        if let Some(l) = try_decode_log::<UpkeepMigrated>(log) {
            return Some(Self::Migrated(l.data.id.into()));
        }
        try_decode_log::<UpkeepTriggerConfigSet>(log).map(|l| Self::TriggerConfigSet {
            upkeep_id: l.data.id.into(),
            config: l.data.triggerConfig,
        })
    }

    /// Returns the upkeep the event is about.
    pub const fn upkeep_id(&self) -> UpkeepId {
        match self {
            Self::Registered(id) |
            Self::Received(id) |
            Self::Unpaused(id) |
            Self::Paused(id) |
            Self::Canceled(id) |
            Self::Migrated(id) |
            Self::TriggerConfigSet { upkeep_id: id, .. } => *id,
        }
    }
}
