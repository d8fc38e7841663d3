/// The reason an upkeep is not eligible to be performed.
///
/// Codes below 32 are returned by the registry contract, codes from 32 onwards are assigned by
/// the node itself.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[repr(u8)]
pub enum UpkeepFailureReason {
    /// No failure.
    #[default]
    None = 0,
    /// The upkeep was cancelled.
    UpkeepCancelled = 1,
    /// The upkeep is paused.
    UpkeepPaused = 2,
    /// The target check reverted.
    TargetCheckReverted = 3,
    /// The upkeep does not need to be performed.
    UpkeepNotNeeded = 4,
    /// The perform data is over the registry limit.
    PerformDataExceedsLimit = 5,
    /// The upkeep balance cannot cover the perform.
    InsufficientBalance = 6,
    /// The streams callback reverted.
    CallbackReverted = 7,
    /// The revert data is over the registry limit.
    RevertDataExceedsLimit = 8,
    /// The registry is paused.
    RegistryPaused = 9,
    /// The upkeep is not allowed to use streams lookups.
    StreamsAccessNotAllowed = 32,
    /// The triggering transaction can no longer be found.
    TxHashNoLongerExists = 33,
    /// The revert data of a lookup is malformed.
    InvalidRevertDataInput = 34,
    /// The perform simulation failed.
    SimulationFailed = 35,
    /// The triggering transaction was reorged into another block.
    TxHashReorged = 36,
}

impl UpkeepFailureReason {
    /// Returns the reason for the provided code, if known.
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::None,
            1 => Self::UpkeepCancelled,
            2 => Self::UpkeepPaused,
            3 => Self::TargetCheckReverted,
            4 => Self::UpkeepNotNeeded,
            5 => Self::PerformDataExceedsLimit,
            6 => Self::InsufficientBalance,
            7 => Self::CallbackReverted,
            8 => Self::RevertDataExceedsLimit,
            9 => Self::RegistryPaused,
            32 => Self::StreamsAccessNotAllowed,
            33 => Self::TxHashNoLongerExists,
            34 => Self::InvalidRevertDataInput,
            35 => Self::SimulationFailed,
            36 => Self::TxHashReorged,
            _ => return None,
        })
    }

    /// Returns the code of the reason.
    pub const fn code(&self) -> u8 {
        *self as u8
    }
}

/// The state of the node side check pipeline, distinguishing internal failures from on chain
/// determined ineligibility.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[repr(u8)]
pub enum PipelineExecutionState {
    /// The pipeline completed.
    #[default]
    NoPipelineError = 0,
    /// The check block is too far behind the latest block.
    CheckBlockTooOld = 1,
    /// The check block hash does not match the canonical chain.
    CheckBlockInvalid = 2,
    /// An RPC call failed.
    RpcFlakyFailure = 3,
    /// A streams request failed.
    StreamsFlakyFailure = 4,
    /// Failed to pack or unpack ABI data.
    PackUnpackDecodeFailed = 5,
    /// Failed to parse the upkeep privilege config.
    StreamsUnmarshalError = 6,
    /// The streams request could not be built.
    InvalidStreamsRequest = 7,
    /// The streams response could not be decoded.
    InvalidStreamsResponse = 8,
    /// The upkeep is not authorized to use streams.
    UpkeepNotAuthorized = 9,
}

impl PipelineExecutionState {
    /// Returns the code of the state.
    pub const fn code(&self) -> u8 {
        *self as u8
    }
}
