//! Leadforge Database Crate
//!
//! Connection management, embedded migrations, and the timestamp encoding
//! shared by every table.

use leadforge_config::DatabaseConfig;
use sqlx::SqlitePool;
use thiserror::Error;

pub mod connection;
pub mod migrations;
pub mod time;

pub use connection::prepare_database;
pub use migrations::{run_migrations, MIGRATOR};
pub use time::{parse_timestamp, timestamp};

/// Re-export commonly used types for convenience
pub use sqlx::{Pool, Sqlite};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    #[error("Database migration error: {0}")]
    MigrationError(String),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Initialize the database with migrations
pub async fn initialize_database(config: &DatabaseConfig) -> DatabaseResult<SqlitePool> {
    let pool = prepare_database(config)
        .await
        .map_err(|e| DatabaseError::ConnectionError(format!("{e:#}")))?;

    run_migrations(&pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("{e:#}")))?;

    Ok(pool)
}
