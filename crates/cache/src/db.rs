//! Opening the metadata store.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Listings and uploads from several requests at once.
const MAX_CONNECTIONS: u32 = 8;
/// Concurrent listings all backfill records, and WAL allows a single writer.
const BUSY_TIMEOUT: Duration = Duration::from_millis(1500);

/// Pool of connections to the SQLite file holding every owner's records.
///
/// Migrations have always been applied by the time one of these exists.
/// Wrap it in a [`Repository`](crate::Repository) to work with records.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the store at `path`, including any missing
    /// parent directories.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Database)?;
        }
        let options = Self::options().filename(path).create_if_missing(true);
        Self::open(options, MAX_CONNECTIONS).await
    }

    /// Opens a private store that disappears with its last connection.
    ///
    /// Limited to one connection, since every new connection to `:memory:`
    /// would otherwise get an empty database of its own. Not test-only so
    /// that other crates' tests can use it.
    pub async fn connect_in_memory() -> Result<Self> {
        Self::open(Self::options().filename(":memory:"), 1).await
    }

    fn options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
    }

    async fn open(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            // Runs on every connection the pool opens, not just the first.
            .after_connect(|conn, _meta| Box::pin(async move { Self::tune(conn).await }))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Settings `SqliteConnectOptions` has no builder method for.
    async fn tune(conn: &mut SqliteConnection) -> sqlx::Result<()> {
        sqlx::query("PRAGMA cache_size = -4096; PRAGMA temp_store = MEMORY;")
            .execute(conn)
            .await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)?;
        tracing::debug!("Metadata store is up to date");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Waits for checked-out connections to come back, then closes them all.
    pub async fn close(&self) {
        // Refreshes query planner statistics; failing to is harmless.
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}
