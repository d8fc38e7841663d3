use alloy_primitives::B256;
use automation_primitives::{CheckResult, UpkeepState};
use automation_upkeepstate::{UpkeepStateError, UpkeepStateUpdater};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};

use crate::BlockSource;

/// An [`UpkeepStateUpdater`] recording the states it receives.
#[derive(Debug, Default, Clone)]
pub struct RecordingStateUpdater {
    records: Arc<Mutex<Vec<(CheckResult, UpkeepState)>>>,
}

impl RecordingStateUpdater {
    /// Returns a new empty [`RecordingStateUpdater`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the states recorded so far.
    pub fn records(&self) -> Vec<(CheckResult, UpkeepState)> {
        self.records.lock().clone()
    }
}

#[async_trait::async_trait]
impl UpkeepStateUpdater for RecordingStateUpdater {
    async fn update_upkeep_state(
        &self,
        result: &CheckResult,
        state: UpkeepState,
    ) -> Result<(), UpkeepStateError> {
        self.records.lock().push((result.clone(), state));
        Ok(())
    }
}

/// A [`BlockSource`] over a fixed set of blocks.
#[derive(Debug, Default, Clone)]
pub struct StaticBlockSource {
    inner: Arc<Mutex<(u64, HashMap<u64, B256>)>>,
}

impl StaticBlockSource {
    /// Returns a new empty [`StaticBlockSource`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks the block, moving the latest block forward if needed.
    pub fn add_block(&self, number: u64, hash: B256) {
        let mut inner = self.inner.lock();
        inner.0 = inner.0.max(number);
        inner.1.insert(number, hash);
    }
}

impl BlockSource for StaticBlockSource {
    fn latest_block(&self) -> u64 {
        self.inner.lock().0
    }

    fn block_hash(&self, number: u64) -> Option<B256> {
        self.inner.lock().1.get(&number).copied()
    }
}
