pub mod connection;
pub mod executor;
pub mod migrations;

use ema_core::config::DatabaseConfig;
use thiserror::Error;
use tracing::info;

pub use connection::{connect, connect_with_settings, DbPool};
pub use executor::SqlRunner;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database connection failed: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

/// Connects to the mirrored store and brings its schema up to date.
pub async fn open(config: &DatabaseConfig) -> Result<DbPool, DbError> {
    let pool = connect_with_settings(config).await.map_err(DbError::Connect)?;
    info!(
        event_name = "db.connected",
        max_connections = config.max_connections,
        "database connection established"
    );

    migrations::run_pending(&pool).await.map_err(DbError::Migration)?;
    info!(event_name = "db.migrations_applied", "database migrations applied");

    Ok(pool)
}
