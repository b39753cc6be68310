//! Error types for the PostgreSQL backends.

use claimflow_storage::StorageError;
use thiserror::Error;

/// Errors raised while managing the PostgreSQL backend itself.
#[derive(Debug, Error)]
pub enum PostgresError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),
}

/// Result type alias using PostgresError
pub type Result<T> = std::result::Result<T, PostgresError>;

/// Maps a driver error onto the storage error taxonomy. Connection-level
/// failures are distinguished so callers can log them as infrastructure
/// problems; everything else is a generic database error and retryable.
pub(crate) fn storage_err(err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StorageError::connection_error(err.to_string())
        }
        other => StorageError::database(other.to_string()),
    }
}
