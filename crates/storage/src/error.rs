//! Storage and query errors

use thiserror::Error;

/// SQLite primary result codes that clear once the other connection lets go
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl StorageError {
    /// Whether the failure was a transient busy/locked condition
    pub fn is_busy(&self) -> bool {
        match self {
            StorageError::DatabaseError(sqlx::Error::Database(db)) => db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| matches!(code & 0xFF, SQLITE_BUSY | SQLITE_LOCKED))
                .unwrap_or(false),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::SerializationError(e.to_string())
    }
}

/// Rejected or failed query-side requests
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Unknown table: {0}")]
    UnknownTable(String),
    #[error("Unknown column '{column}' in table {table}")]
    UnknownColumn { table: String, column: String },
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),
    #[error("Invalid sort order: {0}")]
    InvalidSortOrder(String),
    #[error("Unsupported condition value for '{0}'")]
    InvalidValue(String),
    #[error("Missing time range")]
    MissingTimeRange,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
