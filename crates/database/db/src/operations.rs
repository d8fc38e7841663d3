use super::{models, DatabaseError};
use crate::DatabaseConnectionProvider;

use automation_primitives::{UpkeepStateRecord, WorkId};
use sea_orm::{sea_query::OnConflict, ColumnTrait, Condition, EntityTrait, QueryFilter};

/// The [`DatabaseOperations`] trait provides methods for interacting with the database.
#[async_trait::async_trait]
pub trait DatabaseOperations: DatabaseConnectionProvider + Sync {
    /// Inserts the [`UpkeepStateRecord`]s for the chain, ignoring records whose work id is
    /// already stored. Returns the number of inserted rows.
    async fn insert_upkeep_states(
        &self,
        chain_id: u64,
        records: Vec<UpkeepStateRecord>,
    ) -> Result<u64, DatabaseError> {
        if records.is_empty() {
            return Ok(0);
        }
        tracing::trace!(target: "automation::db", chain_id, count = records.len(), "Inserting upkeep states into database.");

        let models =
            records.into_iter().map(|r| models::upkeep_state::ActiveModel::from((chain_id, r)));
        Ok(models::upkeep_state::Entity::insert_many(models)
            .on_conflict(
                OnConflict::columns([
                    models::upkeep_state::Column::ChainId,
                    models::upkeep_state::Column::WorkId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(self.get_connection())
            .await?)
    }

    /// Returns the [`UpkeepStateRecord`]s of the chain for the provided work ids. Work ids without
    /// a stored record are absent from the result.
    async fn get_upkeep_states(
        &self,
        chain_id: u64,
        work_ids: &[WorkId],
    ) -> Result<Vec<UpkeepStateRecord>, DatabaseError> {
        if work_ids.is_empty() {
            return Ok(vec![]);
        }

        models::upkeep_state::Entity::find()
            .filter(
                Condition::all()
                    .add(models::upkeep_state::Column::ChainId.eq(chain_id as i64))
                    .add(
                        models::upkeep_state::Column::WorkId
                            .is_in(work_ids.iter().map(ToString::to_string)),
                    ),
            )
            .all(self.get_connection())
            .await?
            .into_iter()
            .map(TryInto::try_into)
            .collect()
    }

    /// Deletes the [`UpkeepStateRecord`]s of the chain inserted before the provided unix
    /// timestamp in milliseconds. Returns the number of deleted rows.
    async fn delete_upkeep_states_before(
        &self,
        chain_id: u64,
        inserted_before: u64,
    ) -> Result<u64, DatabaseError> {
        tracing::trace!(target: "automation::db", chain_id, inserted_before, "Deleting expired upkeep states.");
        Ok(models::upkeep_state::Entity::delete_many()
            .filter(
                Condition::all()
                    .add(models::upkeep_state::Column::ChainId.eq(chain_id as i64))
                    .add(models::upkeep_state::Column::InsertedAt.lt(inserted_before as i64)),
            )
            .exec(self.get_connection())
            .await
            .map(|res| res.rows_affected)?)
    }
}

impl<T> DatabaseOperations for T where T: DatabaseConnectionProvider + Sync {}
