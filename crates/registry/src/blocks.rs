use alloy_primitives::B256;
use automation_providers::{HeadBroadcaster, LogIndex};
use automation_watcher::BlockSubscriber;

/// A source of the recent canonical blocks as seen by the node.
#[auto_impl::auto_impl(&, Arc)]
pub trait BlockSource: Send + Sync {
    /// Returns the latest block number, zero if none was observed yet.
    fn latest_block(&self) -> u64;

    /// Returns the hash of the block, if tracked.
    fn block_hash(&self, number: u64) -> Option<B256>;
}

impl<L, H> BlockSource for BlockSubscriber<L, H>
where
    L: LogIndex + 'static,
    H: HeadBroadcaster + 'static,
{
    fn latest_block(&self) -> u64 {
        Self::latest_block(self)
    }

    fn block_hash(&self, number: u64) -> Option<B256> {
        Self::block_hash(self, number)
    }
}
