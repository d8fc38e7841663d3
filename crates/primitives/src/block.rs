use alloy_primitives::B256;

/// Information about a block.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BlockInfo {
    /// The block number.
    pub number: u64,
    /// The block hash.
    pub hash: B256,
}

impl BlockInfo {
    /// Returns a new instance of [`BlockInfo`].
    pub const fn new(number: u64, hash: B256) -> Self {
        Self { number, hash }
    }
}

impl From<(u64, B256)> for BlockInfo {
    fn from((number, hash): (u64, B256)) -> Self {
        Self { number, hash }
    }
}

#[cfg(feature = "arbitrary")]
impl arbitrary::Arbitrary<'_> for BlockInfo {
    fn arbitrary(u: &mut arbitrary::Unstructured<'_>) -> arbitrary::Result<Self> {
        let number = u.int_in_range(0..=u32::MAX)?;
        let hash = B256::arbitrary(u)?;
        Ok(Self { number: number as u64, hash })
    }
}

/// A bounded slice of recent blocks, ordered from the most recent to the oldest.
#[derive(Debug, Default, Clone, PartialEq, Eq, derive_more::From)]
pub struct BlockHistory(pub Vec<BlockInfo>);

impl BlockHistory {
    /// Returns the most recent block of the history.
    pub fn latest(&self) -> Option<&BlockInfo> {
        self.0.first()
    }

    /// Returns the blocks of the history.
    pub fn blocks(&self) -> &[BlockInfo] {
        &self.0
    }

    /// Returns the hash of the block at the provided number, if part of the history.
    pub fn hash_at(&self, number: u64) -> Option<B256> {
        self.0.iter().find(|b| b.number == number).map(|b| b.hash)
    }

    /// Returns the number of blocks in the history.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the history is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
