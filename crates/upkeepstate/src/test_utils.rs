use crate::{UpkeepStateError, UpkeepStateOrm, UpkeepStateReader};

use automation_primitives::{UpkeepState, UpkeepStateRecord, WorkId};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// An in memory [`UpkeepStateOrm`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryOrm {
    records: Arc<Mutex<HashMap<WorkId, UpkeepStateRecord>>>,
    inserts: Arc<Mutex<Vec<usize>>>,
}

impl InMemoryOrm {
    /// Returns a new empty [`InMemoryOrm`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored records.
    pub fn records(&self) -> Vec<UpkeepStateRecord> {
        self.records.lock().values().copied().collect()
    }

    /// Returns the size of each batch inserted so far.
    pub fn inserts(&self) -> Vec<usize> {
        self.inserts.lock().clone()
    }
}

#[async_trait::async_trait]
impl UpkeepStateOrm for InMemoryOrm {
    async fn insert_upkeep_states(
        &self,
        records: Vec<UpkeepStateRecord>,
    ) -> Result<(), UpkeepStateError> {
        self.inserts.lock().push(records.len());
        let mut stored = self.records.lock();
        for record in records {
            stored.entry(record.work_id).or_insert(record);
        }
        Ok(())
    }

    async fn select_upkeep_states(
        &self,
        work_ids: &[WorkId],
    ) -> Result<Vec<UpkeepStateRecord>, UpkeepStateError> {
        let stored = self.records.lock();
        Ok(work_ids.iter().filter_map(|id| stored.get(id).copied()).collect())
    }

    async fn delete_expired_upkeep_states(&self, before: u64) -> Result<u64, UpkeepStateError> {
        let mut stored = self.records.lock();
        let len = stored.len();
        stored.retain(|_, record| record.inserted_at >= before);
        Ok((len - stored.len()) as u64)
    }
}

/// An [`UpkeepStateReader`] serving fixed states. Unset work ids are [`UpkeepState::Unknown`].
#[derive(Debug, Default, Clone)]
pub struct StaticStateReader {
    states: Arc<Mutex<HashMap<WorkId, UpkeepState>>>,
    failing: Arc<AtomicBool>,
}

impl StaticStateReader {
    /// Returns a new [`StaticStateReader`] without any state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the state of the work id.
    pub fn set_state(&self, work_id: WorkId, state: UpkeepState) {
        self.states.lock().insert(work_id, state);
    }

    /// Makes every read fail while set.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }
}

#[async_trait::async_trait]
impl UpkeepStateReader for StaticStateReader {
    async fn select_by_work_ids(
        &self,
        work_ids: &[WorkId],
    ) -> Result<Vec<UpkeepState>, UpkeepStateError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(UpkeepStateError::Orm("state reader failing".to_string()));
        }
        let states = self.states.lock();
        Ok(work_ids.iter().map(|id| states.get(id).copied().unwrap_or_default()).collect())
    }
}
