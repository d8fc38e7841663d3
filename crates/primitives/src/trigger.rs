use crate::UpkeepId;

use alloy_primitives::{keccak256, Address, B256};
use std::fmt;

/// The log that triggered a log upkeep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct LogTriggerExtension {
    /// The hash of the transaction which emitted the log.
    pub tx_hash: B256,
    /// The index of the log in the block.
    pub log_index: u32,
    /// The hash of the block containing the log.
    pub block_hash: B256,
    /// The number of the block containing the log.
    pub block_number: u64,
}

impl LogTriggerExtension {
    /// Returns the bytes uniquely identifying the log: block hash, transaction hash and the big
    /// endian log index.
    pub fn log_identifier(&self) -> [u8; 68] {
        let mut id = [0u8; 68];
        id[..32].copy_from_slice(self.block_hash.as_slice());
        id[32..64].copy_from_slice(self.tx_hash.as_slice());
        id[64..].copy_from_slice(&self.log_index.to_be_bytes());
        id
    }
}

/// The trigger of an upkeep check: the check block and, for log upkeeps, the triggering log.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct Trigger {
    /// The block at which the check is performed.
    pub block_number: u64,
    /// The hash of the check block.
    pub block_hash: B256,
    /// The triggering log, present for log trigger upkeeps.
    pub log_trigger_extension: Option<LogTriggerExtension>,
}

impl Trigger {
    /// Returns a new block based [`Trigger`].
    pub const fn new(block_number: u64, block_hash: B256) -> Self {
        Self { block_number, block_hash, log_trigger_extension: None }
    }

    /// Returns a new [`Trigger`] with the provided log extension.
    pub const fn with_log(
        block_number: u64,
        block_hash: B256,
        extension: LogTriggerExtension,
    ) -> Self {
        Self { block_number, block_hash, log_trigger_extension: Some(extension) }
    }
}

/// A content derived identifier of a unit of work: the keccak hash of the upkeep identifier and
/// the log identifier of the trigger, if any.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct WorkId(pub B256);

impl WorkId {
    /// Derives the [`WorkId`] for the upkeep and trigger.
    pub fn new(upkeep_id: &UpkeepId, trigger: &Trigger) -> Self {
        let mut preimage = upkeep_id.to_bytes().to_vec();
        if let Some(ext) = &trigger.log_trigger_extension {
            preimage.extend_from_slice(&ext.log_identifier());
        }
        Self(keccak256(preimage))
    }

    /// Parses a [`WorkId`] from its hex representation, with or without prefix.
    pub fn from_hex(s: &str) -> Option<Self> {
        s.parse::<B256>().ok().map(Self)
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.as_slice() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl From<B256> for WorkId {
    fn from(value: B256) -> Self {
        Self(value)
    }
}

/// The on chain trigger configuration of a log upkeep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct LogTriggerConfig {
    /// The address of the contract emitting the logs.
    pub contract_address: Address,
    /// Bitmask selecting which of `topic1`, `topic2` and `topic3` take part in the filter: bit
    /// `i` selects topic `i + 1`.
    pub filter_selector: u8,
    /// The event signature.
    pub topic0: B256,
    /// The first indexed topic.
    pub topic1: B256,
    /// The second indexed topic.
    pub topic2: B256,
    /// The third indexed topic.
    pub topic3: B256,
}

impl LogTriggerConfig {
    /// Returns the indexed topics selected by the filter selector, in order. Zero topics are
    /// never selected.
    pub fn selected_topics(&self) -> Vec<B256> {
        [self.topic1, self.topic2, self.topic3]
            .into_iter()
            .enumerate()
            .filter(|(i, topic)| self.filter_selector & (1 << i) != 0 && !topic.is_zero())
            .map(|(_, topic)| topic)
            .collect()
    }

    /// Returns true if the indexed topics of a log match the selected topics of the config, each
    /// at its own position. A zero selector matches any log.
    pub fn matches_topics(&self, topics: &[B256]) -> bool {
        [self.topic1, self.topic2, self.topic3].iter().enumerate().all(|(i, topic)| {
            self.filter_selector & (1 << i) == 0 ||
                topic.is_zero() ||
                topics.get(i + 1).is_some_and(|t| t == topic)
        })
    }
}
