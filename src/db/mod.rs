mod migrations;
mod models;
mod queries;

pub use models::*;
pub use queries::*;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::info;

use crate::config::Config;

/// Connection pool sizing for the forum database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    /// How long a writer waits on a locked database before `SQLITE_BUSY`.
    pub busy_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&Config> for PoolSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_connections: config.database_max_connections,
            busy_timeout: config.database_busy_timeout,
        }
    }
}

/// Handle to the forum database. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the database file with default pool settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, migrated or written.
    pub async fn new(path: &Path) -> Result<Self> {
        Self::open(path, PoolSettings::default()).await
    }

    /// Open (creating if needed) the database file and bring its schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, migrated or written.
    pub async fn open(path: &Path, settings: PoolSettings) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(settings.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open forum database {}", path.display()))?;

        let db = Self::migrated(pool).await?;
        db.check_writable(path).await?;
        info!(
            path = %path.display(),
            max_connections = settings.max_connections,
            "Forum database opened"
        );
        Ok(db)
    }

    /// A private in-memory database, mainly for tests.
    ///
    /// Every connection to `sqlite::memory:` sees its own database, so the
    /// pool holds exactly one connection and never recycles it.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("Invalid in-memory database URL")?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory forum database")?;

        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self> {
        migrations::run(&pool).await?;
        Ok(Self { pool })
    }

    /// Fail at startup, not on the first post, when the file is read-only.
    async fn check_writable(&self, path: &Path) -> Result<()> {
        let tx = self.pool.begin().await.with_context(|| {
            format!(
                "Forum database {} is not writable; check its permissions",
                path.display()
            )
        })?;
        tx.commit()
            .await
            .context("Failed to commit forum database write check")?;
        Ok(())
    }

    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
