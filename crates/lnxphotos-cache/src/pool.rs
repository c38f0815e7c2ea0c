//! SQLite pool for LNXPhotos state
//!
//! The sync process is the only writer. Its stores are called from the
//! coordinating loop and from the ledger flusher, so the pool holds one
//! connection and writes queue on it rather than contend for the file lock.
//! `status` and `failures` open the same file from another process and read
//! through WAL while a sync is writing.
//!
//! The schema version lives in `PRAGMA user_version`; the schema script runs
//! only against an older database.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::{debug, info};

use crate::CacheError;

/// Bumped whenever the schema script changes
const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = include_str!("migrations/20261018_initial.sql");

/// Wait on a file lock held by another process
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Wait for the single connection while another store call holds it
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle to the state database
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens the database at `db_path`, creating it and its parent
    /// directories if needed, and brings the schema up to date.
    ///
    /// # Errors
    ///
    /// `CacheError::ConnectionFailed` when the file cannot be opened,
    /// `CacheError::MigrationFailed` when the schema cannot be applied.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = single_writer()
            .connect_with(options)
            .await
            .map_err(|e| CacheError::ConnectionFailed(format!("{}: {e}", db_path.display())))?;

        let db = Self { pool };
        db.migrate().await?;
        info!(path = %db_path.display(), schema = SCHEMA_VERSION, "State database opened");
        Ok(db)
    }

    /// A private in-memory database with the current schema.
    ///
    /// The one connection is never recycled, so the data lives as long as
    /// the pool.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = single_writer()
            .connect("sqlite::memory:")
            .await
            .map_err(|e| CacheError::ConnectionFailed(format!("in-memory database: {e}")))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The schema version recorded in the database
    pub async fn schema_version(&self) -> Result<i64, CacheError> {
        let (version,): (i64,) = sqlx::query_as("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(version)
    }

    async fn migrate(&self) -> Result<(), CacheError> {
        let found = self
            .schema_version()
            .await
            .map_err(|e| CacheError::MigrationFailed(e.to_string()))?;
        if found >= SCHEMA_VERSION {
            debug!(version = found, "Schema up to date");
            return Ok(());
        }

        // Tables and version land together or not at all
        let script =
            format!("BEGIN;\n{SCHEMA}\nPRAGMA user_version = {SCHEMA_VERSION};\nCOMMIT;");
        sqlx::raw_sql(&script)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                CacheError::MigrationFailed(format!("schema v{SCHEMA_VERSION} from v{found}: {e}"))
            })?;

        debug!(from = found, to = SCHEMA_VERSION, "Schema migrated");
        Ok(())
    }
}

fn single_writer() -> SqlitePoolOptions {
    SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .idle_timeout(None)
        .max_lifetime(None)
}
