//! Database connection pool setup.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::DbError;

/// Default maximum number of pooled connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Connect to Postgres and build a connection pool.
///
/// # Errors
///
/// Returns `DbError::ConnectionFailed` if the database is unreachable or
/// the credentials are rejected.
pub async fn connect(database_url: &str) -> Result<PgPool, DbError> {
    connect_with_max(database_url, DEFAULT_MAX_CONNECTIONS).await
}

/// Connect with an explicit pool size.
pub async fn connect_with_max(database_url: &str, max_connections: u32) -> Result<PgPool, DbError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(DbError::ConnectionFailed)
}
