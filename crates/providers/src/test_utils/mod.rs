use alloy_primitives::{Address, Bytes, LogData, B256};
use alloy_rpc_types_eth::Log;

/// Test utils for arbitrary.
pub mod arbitrary;

/// A mock chain client.
pub mod chain;
pub use chain::MockChainClient;

/// A mock head broadcaster.
pub mod head;
pub use head::MockHeadBroadcaster;

/// A mock log index.
pub mod log_index;
pub use log_index::MockLogIndex;

/// Returns a mined log emitted by the address with the provided topics, at the position
/// `(block_number, log_index)`. Block and transaction hashes are derived from the position.
pub fn mined_log(address: Address, topics: Vec<B256>, block_number: u64, log_index: u64) -> Log {
    Log {
        inner: alloy_primitives::Log {
            address,
            data: LogData::new_unchecked(topics, Bytes::new()),
        },
        block_hash: Some(block_hash(block_number)),
        block_number: Some(block_number),
        block_timestamp: Some(block_number * 12),
        transaction_hash: Some(tx_hash(block_number, log_index)),
        transaction_index: Some(0),
        log_index: Some(log_index),
        removed: false,
    }
}

/// Returns the deterministic hash [`mined_log`] uses for the block.
pub fn block_hash(number: u64) -> B256 {
    let mut hash = B256::repeat_byte(0xbb);
    hash[24..].copy_from_slice(&number.to_be_bytes());
    hash
}

/// Returns the deterministic hash [`mined_log`] uses for the transaction at the position.
pub fn tx_hash(block_number: u64, log_index: u64) -> B256 {
    let mut hash = B256::repeat_byte(0xcc);
    hash[16..24].copy_from_slice(&block_number.to_be_bytes());
    hash[24..].copy_from_slice(&log_index.to_be_bytes());
    hash
}
