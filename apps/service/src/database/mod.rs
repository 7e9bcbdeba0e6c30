/// Storage layer for monitors and incidents
///
/// The engine only talks to the [`Database`] trait; [`DatabaseImpl`] backs it
/// with a local LibSQL file.

pub mod error;
pub mod migrations;
pub mod models;
pub mod repository;

pub use error::StorageError;
pub use repository::{Database, DatabaseImpl};

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<(), StorageError> {
    migrations::run_migrations(conn).await
}
