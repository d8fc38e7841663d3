use automation_providers::ProviderError;

/// A type alias for the result of the block subscriber.
pub(crate) type BlockSubscriberResult<T> = Result<T, BlockSubscriberError>;

/// The error type for the block subscriber.
#[derive(Debug, thiserror::Error)]
pub enum BlockSubscriberError {
    /// The subscriber was started while not stopped.
    #[error("block subscriber is already started")]
    AlreadyStarted,
    /// The log index returned no block to bootstrap from.
    #[error("no blocks found in the log index to bootstrap from")]
    NoBlocks,
    /// The subscription does not exist.
    #[error("subscriber {0} does not exist")]
    SubscriberNotFound(u64),
    /// A call to the log index failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}
