use thiserror::Error;
use uuid::Uuid;

use super::models::IncidentStatus;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database query failed: {0}")]
    QueryFailure(#[from] libsql::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Record not found: {0}")]
    NotFound(Uuid),

    /// The row changed since it was read
    #[error("Monitor {monitor} was modified concurrently (expected version {expected})")]
    Conflict { monitor: Uuid, expected: i64 },

    /// An incident transition lost against a concurrent one
    #[error("Incident {incident} is already {found}")]
    StaleIncident { incident: Uuid, found: IncidentStatus },

    /// Unique constraint violation, e.g. a second open incident
    #[error("Unique constraint violation: {0}")]
    Duplicate(String),

    #[error("Stored value could not be decoded: {0}")]
    Decode(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<deadpool::managed::PoolError<libsql::Error>> for StorageError {
    fn from(err: deadpool::managed::PoolError<libsql::Error>) -> Self {
        match err {
            deadpool::managed::PoolError::Backend(e) => StorageError::QueryFailure(e),
            other => StorageError::Pool(other.to_string()),
        }
    }
}

impl From<uuid::Error> for StorageError {
    fn from(err: uuid::Error) -> Self {
        StorageError::Decode(err.to_string())
    }
}
