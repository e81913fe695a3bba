//! Persistent store: connection pool, schema migrations, and repository-style
//! operations over streams, check history, and key/value config.

mod checks;
mod config;
mod legacy;
mod preferences;
mod streams;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use tracing::info;

pub use checks::{Analytics, PlatformStats};
pub use config::{ConfigEntry, ConfigValue};
pub use legacy::{MigrationReport, migrate_legacy};
pub use preferences::StreamPreferences;

const DEFAULT_POOL_SIZE: u32 = 10;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
const DEFAULT_CACHE_SIZE_KB: i32 = -64000;

/// Opens (creating if missing) the SQLite store at `database_url` and runs
/// pending migrations.
pub async fn init_pool(database_url: &str) -> crate::Result<SqlitePool> {
    let connect_options = SqliteConnectOptions::from_str(database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(DEFAULT_POOL_SIZE)
        .acquire_timeout(Duration::from_secs(30))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query(&format!("PRAGMA cache_size = {DEFAULT_CACHE_SIZE_KB}"))
                    .execute(&mut *conn)
                    .await?;
                sqlx::query("PRAGMA temp_store = MEMORY")
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect_with(connect_options)
        .await?;

    info!(max_connections = DEFAULT_POOL_SIZE, "database pool initialized");
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> crate::Result<()> {
    info!("running database migrations");
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Facade over every store operation the rest of the core calls.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_pool_runs_migrations_against_memory_db() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'streams'",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(tables.len(), 1);
    }

    #[tokio::test]
    async fn default_platforms_are_seeded() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM platforms")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 4);
    }
}
