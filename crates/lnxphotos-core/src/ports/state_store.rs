//! Persistence ports (driven/secondary ports)
//!
//! Durable storage for the three pieces of local state: the sync ledger,
//! cached discovery snapshots and the last run state.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific; the
//!   engines log them and carry on with in-memory state where they can.

use crate::domain::{DiscoverySnapshot, LedgerEntry, SyncRunState, UserId};

/// Storage for the full id → entry ledger mapping
#[async_trait::async_trait]
pub trait ILedgerStore: Send + Sync {
    /// Loads every persisted entry
    async fn load_entries(&self) -> anyhow::Result<Vec<LedgerEntry>>;

    /// Replaces the persisted mapping with `entries`
    async fn save_entries(&self, entries: &[LedgerEntry]) -> anyhow::Result<()>;
}

/// Discovery snapshot cache keyed by user identity
#[async_trait::async_trait]
pub trait ISnapshotStore: Send + Sync {
    /// Returns the snapshot last saved for `user`, regardless of age
    async fn load_snapshot(&self, user: &UserId) -> anyhow::Result<Option<DiscoverySnapshot>>;

    /// Stores `snapshot` for `user`, replacing any previous one
    async fn save_snapshot(&self, user: &UserId, snapshot: &DiscoverySnapshot)
        -> anyhow::Result<()>;

    /// Drops the cached snapshot for `user`
    async fn clear_snapshot(&self, user: &UserId) -> anyhow::Result<()>;
}

/// Storage for the most recent run state
#[async_trait::async_trait]
pub trait IRunStateStore: Send + Sync {
    async fn load_run_state(&self) -> anyhow::Result<Option<SyncRunState>>;

    async fn save_run_state(&self, state: &SyncRunState) -> anyhow::Result<()>;
}
