use crate::DatabaseError;

use alloy_primitives::U256;
use automation_primitives::{
    UpkeepFailureReason, UpkeepId, UpkeepState, UpkeepStateRecord, WorkId,
};
use sea_orm::{entity::prelude::*, ActiveValue};

/// A database model that represents a recorded upkeep state.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "upkeep_states")]
pub struct Model {
    #[sea_orm(primary_key)]
    id: i32,
    chain_id: i64,
    work_id: String,
    upkeep_id: String,
    completion_state: i16,
    block_number: i64,
    ineligibility_reason: i16,
    inserted_at: i64,
}

/// The relation for the upkeep state model.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

/// The active model behavior for the upkeep state model.
impl ActiveModelBehavior for ActiveModel {}

impl From<(u64, UpkeepStateRecord)> for ActiveModel {
    fn from((chain_id, record): (u64, UpkeepStateRecord)) -> Self {
        Self {
            id: ActiveValue::NotSet,
            chain_id: ActiveValue::Set(chain_id as i64),
            work_id: ActiveValue::Set(record.work_id.to_string()),
            upkeep_id: ActiveValue::Set(record.upkeep_id.to_string()),
            completion_state: ActiveValue::Set(record.state.code().into()),
            block_number: ActiveValue::Set(record.block_number as i64),
            ineligibility_reason: ActiveValue::Set(record.ineligibility_reason.code().into()),
            inserted_at: ActiveValue::Set(record.inserted_at as i64),
        }
    }
}

impl TryFrom<Model> for UpkeepStateRecord {
    type Error = DatabaseError;

    fn try_from(value: Model) -> Result<Self, Self::Error> {
        let malformed = |column| DatabaseError::MalformedRow { id: value.id, column };
        let work_id = WorkId::from_hex(&value.work_id).ok_or_else(|| malformed("work_id"))?;
        let upkeep_id =
            value.upkeep_id.parse::<U256>().map_err(|_| malformed("upkeep_id"))?;
        let ineligibility_reason = u8::try_from(value.ineligibility_reason)
            .ok()
            .and_then(UpkeepFailureReason::from_code)
            .ok_or_else(|| malformed("ineligibility_reason"))?;
        let state = u8::try_from(value.completion_state)
            .map(UpkeepState::from_code)
            .map_err(|_| malformed("completion_state"))?;

        Ok(Self {
            work_id,
            upkeep_id: UpkeepId(upkeep_id),
            state,
            block_number: value.block_number as u64,
            ineligibility_reason,
            inserted_at: value.inserted_at as u64,
        })
    }
}
