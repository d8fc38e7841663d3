use crate::{ActiveUpkeepList, BlockSource, RegistryError};

use alloy_primitives::Bytes;
use automation_primitives::{Trigger, UpkeepPayload, UpkeepType};
use std::sync::Arc;

/// Provides the payloads of the active conditional upkeeps at the latest block.
#[derive(Debug)]
pub struct ConditionalUpkeepProvider<B> {
    active: Arc<ActiveUpkeepList>,
    blocks: B,
}

impl<B: BlockSource> ConditionalUpkeepProvider<B> {
    /// Returns a new [`ConditionalUpkeepProvider`].
    pub const fn new(active: Arc<ActiveUpkeepList>, blocks: B) -> Self {
        Self { active, blocks }
    }

    /// Returns one payload per active conditional upkeep, triggered at the latest block.
    pub fn get_active_upkeeps(&self) -> Result<Vec<UpkeepPayload>, RegistryError> {
        let latest = self.blocks.latest_block();
        if latest == 0 {
            return Err(RegistryError::NoBlocks);
        }
        let hash = self.blocks.block_hash(latest).ok_or(RegistryError::UnknownBlock(latest))?;
        let trigger = Trigger::new(latest, hash);

        Ok(self
            .active
            .view(&[UpkeepType::Conditional])
            .into_iter()
            .map(|id| UpkeepPayload::new(id, trigger, Bytes::new()))
            .collect())
    }
}
