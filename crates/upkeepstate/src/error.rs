use automation_db::DatabaseError;
use automation_providers::ProviderError;

/// The error type for the upkeep state store.
#[derive(Debug, thiserror::Error)]
pub enum UpkeepStateError {
    /// The store was started twice.
    #[error("upkeep state store is already started")]
    AlreadyStarted,
    /// A call to the log index failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// A call to the durable store failed.
    #[error(transparent)]
    Database(#[from] DatabaseError),
    /// A call to a non database durable store failed.
    #[error("upkeep state orm error: {0}")]
    Orm(String),
}
