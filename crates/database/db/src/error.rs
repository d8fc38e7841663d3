/// The error type for database operations.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// A database error occurred.
    #[error("database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),
    /// A row holds a value which does not map to its domain type.
    #[error("malformed {column} in upkeep state row {id}")]
    MalformedRow {
        /// The id of the row.
        id: i32,
        /// The malformed column.
        column: &'static str,
    },
}
