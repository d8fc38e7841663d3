use crate::UpkeepStateError;

use automation_db::DatabaseOperations;
use automation_primitives::{UpkeepStateRecord, WorkId};

/// The durable store of the ineligible upkeep states of a chain.
#[async_trait::async_trait]
#[auto_impl::auto_impl(Arc)]
pub trait UpkeepStateOrm: Send + Sync {
    /// Inserts the records, ignoring the work ids already stored.
    async fn insert_upkeep_states(
        &self,
        records: Vec<UpkeepStateRecord>,
    ) -> Result<(), UpkeepStateError>;

    /// Returns the stored records for the work ids.
    async fn select_upkeep_states(
        &self,
        work_ids: &[WorkId],
    ) -> Result<Vec<UpkeepStateRecord>, UpkeepStateError>;

    /// Deletes the records inserted before the unix timestamp in milliseconds.
    async fn delete_expired_upkeep_states(&self, before: u64) -> Result<u64, UpkeepStateError>;
}

/// An [`UpkeepStateOrm`] over the relational database, scoped to a chain.
#[derive(Debug, Clone)]
pub struct DatabaseOrm<D> {
    database: D,
    chain_id: u64,
}

impl<D> DatabaseOrm<D> {
    /// Returns a new [`DatabaseOrm`] for the chain.
    pub const fn new(database: D, chain_id: u64) -> Self {
        Self { database, chain_id }
    }
}

#[async_trait::async_trait]
impl<D: DatabaseOperations + Send + Sync> UpkeepStateOrm for DatabaseOrm<D> {
    async fn insert_upkeep_states(
        &self,
        records: Vec<UpkeepStateRecord>,
    ) -> Result<(), UpkeepStateError> {
        self.database.insert_upkeep_states(self.chain_id, records).await?;
        Ok(())
    }

    async fn select_upkeep_states(
        &self,
        work_ids: &[WorkId],
    ) -> Result<Vec<UpkeepStateRecord>, UpkeepStateError> {
        Ok(self.database.get_upkeep_states(self.chain_id, work_ids).await?)
    }

    async fn delete_expired_upkeep_states(&self, before: u64) -> Result<u64, UpkeepStateError> {
        Ok(self.database.delete_upkeep_states_before(self.chain_id, before).await?)
    }
}
