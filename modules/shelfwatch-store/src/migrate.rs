use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use shelfwatch_common::StoreError;

/// Open (creating if missing) the SQLite database behind `url`.
pub async fn connect(url: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Run idempotent schema migrations. Safe to call on every startup.
pub async fn migrate(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS titles (
            title          TEXT PRIMARY KEY,
            publish_period TEXT NOT NULL,
            first_seen     TEXT NOT NULL,
            last_seen      TEXT NOT NULL,
            status         TEXT NOT NULL DEFAULT 'tracked'
                           CHECK (status IN ('tracked', 'published'))
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS send_marker (
            id           INTEGER PRIMARY KEY CHECK (id = 1),
            last_sent_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    info!("Schema migrations applied");
    Ok(())
}
