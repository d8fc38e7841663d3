use alloy_primitives::B256;
use automation_primitives::BlockInfo;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A new chain head, linked to the ancestors known locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Head {
    /// The block number.
    pub number: u64,
    /// The block hash.
    pub hash: B256,
    /// The parent of the block, if known.
    pub parent: Option<Box<Head>>,
}

impl Head {
    /// Returns a new [`Head`] without known ancestors.
    pub const fn new(number: u64, hash: B256) -> Self {
        Self { number, hash, parent: None }
    }

    /// Returns the head on top of the provided parent.
    pub fn with_parent(number: u64, hash: B256, parent: Self) -> Self {
        Self { number, hash, parent: Some(Box::new(parent)) }
    }

    /// Returns an iterator over the head and its ancestors, from the head downwards.
    pub fn chain(&self) -> impl Iterator<Item = &Self> {
        std::iter::successors(Some(self), |head| head.parent.as_deref())
    }

    /// Returns the head as a [`BlockInfo`].
    pub const fn block_info(&self) -> BlockInfo {
        BlockInfo::new(self.number, self.hash)
    }
}

/// A feed of new chain heads.
#[auto_impl::auto_impl(Arc)]
pub trait HeadBroadcaster: Send + Sync {
    /// Returns a receiver of all the heads broadcast from now on.
    fn subscribe(&self) -> broadcast::Receiver<Arc<Head>>;
}
