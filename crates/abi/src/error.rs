/// An error occurring while packing or unpacking registry values.
#[derive(Debug, thiserror::Error)]
pub enum AbiError {
    /// Failed to decode the ABI data.
    #[error("abi decode error: {0}")]
    Decode(#[from] alloy_sol_types::Error),
    /// The log is missing fields which are set on mined logs.
    #[error("log is missing the {0} field")]
    IncompleteLog(&'static str),
    /// Triggers of the upkeep type cannot be packed.
    #[error("unsupported upkeep type {0}")]
    UnsupportedUpkeepType(u8),
    /// A value does not fit the width of its ABI type.
    #[error("{0} does not fit the abi type")]
    Overflow(&'static str),
}
