use automation_abi::AbiError;
use automation_providers::ProviderError;

/// An error returned while talking to the streams data provider.
#[derive(Debug, thiserror::Error)]
pub enum StreamsError {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The signing key is not usable.
    #[error("invalid streams signing key")]
    InvalidKey,
    /// The response body could not be decoded.
    #[error("failed to decode streams response: {0}")]
    Decode(String),
    /// A contract call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// ABI data could not be packed or unpacked.
    #[error(transparent)]
    Abi(#[from] AbiError),
}

impl From<serde_json::Error> for StreamsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<hex::FromHexError> for StreamsError {
    fn from(err: hex::FromHexError) -> Self {
        Self::Decode(err.to_string())
    }
}
