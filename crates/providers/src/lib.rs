//! The collaborators the automation node reads the chain through: a log index, a contract caller
//! and a feed of new heads.

pub use chain::{AlloyChainClient, CallRequest, ChainClient, ReceiptInfo};
mod chain;

pub use error::ProviderError;
mod error;

pub use head::{Head, HeadBroadcaster};
mod head;

pub use log_index::{LogFilter, LogIndex};
mod log_index;

#[cfg(feature = "test-utils")]
/// Common test helpers
pub mod test_utils;
