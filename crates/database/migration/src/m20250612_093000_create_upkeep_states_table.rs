use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UpkeepStates::Table)
                    .if_not_exists()
                    .col(pk_auto(UpkeepStates::Id))
                    .col(big_integer(UpkeepStates::ChainId))
                    .col(string_len(UpkeepStates::WorkId, 64))
                    .col(string(UpkeepStates::UpkeepId))
                    .col(small_integer(UpkeepStates::CompletionState))
                    .col(big_integer(UpkeepStates::BlockNumber))
                    .col(small_integer(UpkeepStates::IneligibilityReason))
                    .col(big_integer(UpkeepStates::InsertedAt))
                    .to_owned(),
            )
            .await?;

        // One row per work id and chain, duplicate inserts are ignored.
        manager
            .create_index(
                Index::create()
                    .name("idx_upkeep_states_chain_work_id")
                    .table(UpkeepStates::Table)
                    .col(UpkeepStates::ChainId)
                    .col(UpkeepStates::WorkId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_upkeep_states_inserted_at")
                    .table(UpkeepStates::Table)
                    .col(UpkeepStates::InsertedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(UpkeepStates::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum UpkeepStates {
    Table,
    Id,
    ChainId,
    WorkId,
    UpkeepId,
    CompletionState,
    BlockNumber,
    IneligibilityReason,
    InsertedAt,
}
