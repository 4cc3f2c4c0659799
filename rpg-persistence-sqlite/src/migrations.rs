use log::{info, warn};
use rpg_server_domain::ServiceResult;
use sqlx::{Pool, Sqlite};

use crate::map_db_error;

const SCHEMA_VERSION: i64 = 1;

const MIGRATION_V1: &str = r#"
CREATE TABLE RPGCharacter (
    user_id TEXT PRIMARY KEY NOT NULL,
    losses INTEGER NOT NULL DEFAULT 0,
    wins INTEGER NOT NULL DEFAULT 0,
    draws INTEGER NOT NULL DEFAULT 0,
    last_loss DATETIME NOT NULL DEFAULT 0,
    elo_rank INTEGER NOT NULL DEFAULT 1000,
    peak_elo INTEGER NOT NULL DEFAULT 1000,
    floor_elo INTEGER NOT NULL DEFAULT 1000
);

CREATE TABLE RPGFight (
    message_id TEXT NOT NULL PRIMARY KEY,
    log TEXT NOT NULL
);
"#;

fn migration(version: i64) -> Option<(&'static str, &'static str)> {
    match version {
        1 => Some(("rpg_tables", MIGRATION_V1)),
        _ => None,
    }
}

pub async fn run_migrations(pool: &Pool<Sqlite>) -> ServiceResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY, name TEXT NOT NULL, applied_at TEXT NOT NULL DEFAULT (datetime('now')))",
    )
    .execute(pool)
    .await
    .map_err(map_db_error)?;

    let current_version = current_version(pool).await?;
    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    info!(
        "Migrating database from v{} to v{}",
        current_version, SCHEMA_VERSION
    );
    for version in (current_version + 1)..=SCHEMA_VERSION {
        let Some((name, sql)) = migration(version) else {
            warn!("Unknown migration version: {}", version);
            continue;
        };
        apply_migration(pool, version, name, sql).await?;
    }
    Ok(())
}

pub async fn current_version(pool: &Pool<Sqlite>) -> ServiceResult<i64> {
    let version = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(version) FROM _migrations")
        .fetch_one(pool)
        .await
        .map_err(map_db_error)?;
    Ok(version.unwrap_or(0))
}

async fn apply_migration(
    pool: &Pool<Sqlite>,
    version: i64,
    name: &str,
    sql: &str,
) -> ServiceResult<()> {
    info!("Applying migration v{}: {}", version, name);

    let mut tx = pool.begin().await.map_err(map_db_error)?;
    for statement in sql.split(';').filter(|s| !s.trim().is_empty()) {
        sqlx::query(statement.trim())
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
    }
    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(version)
        .bind(name)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;
    tx.commit().await.map_err(map_db_error)?;

    Ok(())
}
