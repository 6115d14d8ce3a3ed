//! Storage layer for the Lingopath backend.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub mod assignment_repository;
pub mod config_repository;
pub mod error;
pub mod item_repository;
pub mod template_repository;
pub mod uow;

pub use assignment_repository::PgAssignmentRepository;
pub use config_repository::PgConfigRepository;
pub use error::StorageError;
pub use item_repository::PgItemRepository;
pub use template_repository::PgTemplateRepository;
pub use uow::SqlUnitOfWork;

/// Create a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str, pool_size: u32) -> Result<PgPool, StorageError> {
    PgPoolOptions::new()
        .max_connections(pool_size)
        .connect(database_url)
        .await
        .map_err(StorageError::Connection)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(StorageError::Migration)
}

/// Check database connectivity.
pub async fn check_connection(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(StorageError::Query)?;
    Ok(())
}
