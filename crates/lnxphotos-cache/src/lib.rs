//! LNXPhotos Cache - Local state persistence
//!
//! SQLite-based storage for:
//! - The sync ledger (per-item download outcomes)
//! - Discovery snapshots, one per library owner
//! - The most recent download run state
//!
//! ## Architecture
//!
//! This crate implements the `ILedgerStore`, `ISnapshotStore` and
//! `IRunStateStore` ports from `lnxphotos-core` using SQLite as the storage
//! backend. It is a driven (secondary) adapter in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteLedgerStore`], [`SqliteSnapshotStore`], [`SqliteRunStateStore`] - Port implementations
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use lnxphotos_cache::{DatabasePool, SqliteLedgerStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/lnxphotos/state.db")).await?;
//! let ledger = SqliteLedgerStore::new(pool.pool().clone());
//! // Use ledger as ILedgerStore...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::{SqliteLedgerStore, SqliteRunStateStore, SqliteSnapshotStore};

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
