use automation_abi::AbiError;
use automation_logprovider::LogProviderError;
use automation_providers::ProviderError;

/// The error type for the registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The registry was started twice.
    #[error("registry is already started")]
    AlreadyStarted,
    /// No block has been observed yet.
    #[error("no block is known yet")]
    NoBlocks,
    /// The hash of the latest block is unknown.
    #[error("hash of block {0} is unknown")]
    UnknownBlock(u64),
    /// A report could not be extracted.
    #[error("invalid report: {0}")]
    InvalidReport(&'static str),
    /// A chain collaborator failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// The log event provider failed.
    #[error(transparent)]
    LogProvider(#[from] LogProviderError),
    /// ABI data could not be packed or unpacked.
    #[error(transparent)]
    Abi(#[from] AbiError),
}

impl From<alloy_sol_types::Error> for RegistryError {
    fn from(err: alloy_sol_types::Error) -> Self {
        Self::Abi(err.into())
    }
}
