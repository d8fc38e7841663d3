/// An error returned by a chain collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// A transport error occurred.
    #[error("transport error: {0}")]
    Transport(#[from] alloy_transport::TransportError),
    /// The filter is not registered with the log index.
    #[error("filter {0} is not registered")]
    FilterNotFound(String),
    /// The requested block could not be found.
    #[error("block {0} not found")]
    BlockNotFound(u64),
    /// A generic error occurred.
    #[error("{0}")]
    Other(String),
}
