use std::str::FromStr;

use rpg_server_domain::ServiceError;
use sqlx::{
    Pool, Sqlite,
    error::ErrorKind,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

pub mod characters;
pub mod fights;
pub mod migrations;

pub async fn create_db_pool(
    db_path: &str,
    max_connections: u32,
) -> Result<Pool<Sqlite>, ServiceError> {
    let conn_options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(conn_options)
        .await
        .map_err(|e| ServiceError::Internal(format!("Failed to open {}: {}", db_path, e)))
}

/// A single-connection pool over a private in-memory database.
pub async fn create_memory_pool() -> Result<Pool<Sqlite>, ServiceError> {
    let conn_options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(map_db_error)?;

    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(conn_options)
        .await
        .map_err(map_db_error)
}

pub(crate) fn map_db_error(e: sqlx::Error) -> ServiceError {
    let sqlx::Error::Database(db_error) = &e else {
        return ServiceError::Internal(e.to_string());
    };
    match db_error.kind() {
        ErrorKind::UniqueViolation => ServiceError::Conflict(db_error.message().to_string()),
        ErrorKind::NotNullViolation
        | ErrorKind::CheckViolation
        | ErrorKind::ForeignKeyViolation => {
            ServiceError::ConstraintViolation(db_error.message().to_string())
        }
        _ => ServiceError::Internal(e.to_string()),
    }
}

#[cfg(test)]
pub(crate) async fn migrated_memory_pool() -> Pool<Sqlite> {
    let pool = create_memory_pool().await.expect("Failed to create pool");
    migrations::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}
