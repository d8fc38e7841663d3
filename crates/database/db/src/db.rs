use super::DatabaseConnectionProvider;
use crate::error::DatabaseError;

use sea_orm::{Database as SeaOrmDatabase, DatabaseConnection};

/// The [`Database`] struct is responsible for interacting with the database.
///
/// The [`Database`] type wraps a [`sea_orm::DatabaseConnection`]. We implement
/// [`DatabaseConnectionProvider`] for [`Database`] such that it can be used to perform the
/// operations defined in [`crate::DatabaseOperations`].
#[derive(Debug, Clone)]
pub struct Database {
    /// The underlying database connection.
    connection: DatabaseConnection,
}

impl Database {
    /// Creates a new [`Database`] instance associated with the provided database URL.
    pub async fn new(database_url: &str) -> Result<Self, DatabaseError> {
        let connection = SeaOrmDatabase::connect(database_url).await?;
        Ok(Self { connection })
    }
}

impl DatabaseConnectionProvider for Database {
    type Connection = DatabaseConnection;

    fn get_connection(&self) -> &Self::Connection {
        &self.connection
    }
}

impl From<DatabaseConnection> for Database {
    fn from(connection: DatabaseConnection) -> Self {
        Self { connection }
    }
}

#[cfg(test)]
mod test {
    use crate::{operations::DatabaseOperations, test_utils::setup_test_db};
    use arbitrary::{Arbitrary, Unstructured};
    use automation_primitives::{UpkeepFailureReason, UpkeepState, UpkeepStateRecord};
    use rand::Rng;

    fn random_records(n: usize) -> Vec<UpkeepStateRecord> {
        let mut bytes = [0u8; 4096];
        rand::rng().fill(bytes.as_mut_slice());
        let mut u = Unstructured::new(&bytes);

        (0..n)
            .map(|i| {
                let mut record = UpkeepStateRecord::arbitrary(&mut u).unwrap();
                record.state = UpkeepState::Ineligible;
                record.ineligibility_reason = UpkeepFailureReason::UpkeepNotNeeded;
                record.block_number = u32::MAX as u64 + i as u64;
                record.inserted_at = 1_000 + i as u64;
                record
            })
            .collect()
    }

    #[tokio::test]
    async fn test_database_round_trip_upkeep_states() -> eyre::Result<()> {
        // Given
        let db = setup_test_db().await;
        let records = random_records(3);

        // When
        let inserted = db.insert_upkeep_states(1, records.clone()).await?;
        let work_ids: Vec<_> = records.iter().map(|r| r.work_id).collect();
        let mut from_db = db.get_upkeep_states(1, &work_ids).await?;

        // Then
        assert_eq!(inserted, 3);
        from_db.sort_by_key(|r| r.inserted_at);
        assert_eq!(from_db, records);
        assert!(db.get_upkeep_states(2, &work_ids).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_database_ignores_duplicate_work_ids() -> eyre::Result<()> {
        // Given
        let db = setup_test_db().await;
        let records = random_records(2);
        db.insert_upkeep_states(1, records.clone()).await?;

        // When
        let mut duplicate = records[0];
        duplicate.block_number += 1;
        let inserted = db.insert_upkeep_states(1, vec![duplicate]).await?;

        // Then
        assert_eq!(inserted, 0);
        let from_db = db.get_upkeep_states(1, &[duplicate.work_id]).await?;
        assert_eq!(from_db, vec![records[0]]);

        // the same work id on another chain is a distinct row.
        assert_eq!(db.insert_upkeep_states(2, vec![duplicate]).await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_database_deletes_expired_upkeep_states() -> eyre::Result<()> {
        // Given
        let db = setup_test_db().await;
        let records = random_records(3);
        db.insert_upkeep_states(1, records.clone()).await?;

        // When
        let deleted = db.delete_upkeep_states_before(1, 1_002).await?;

        // Then
        assert_eq!(deleted, 2);
        let work_ids: Vec<_> = records.iter().map(|r| r.work_id).collect();
        assert_eq!(db.get_upkeep_states(1, &work_ids).await?, vec![records[2]]);

        Ok(())
    }
}
