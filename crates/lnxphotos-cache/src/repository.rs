//! SQLite implementations of the persistence ports
//!
//! ## Type Mapping
//!
//! | Domain Type        | SQL Type | Strategy                                   |
//! |--------------------|----------|--------------------------------------------|
//! | MediaItemId        | TEXT     | `.as_str()` / `MediaItemId::new()`         |
//! | UserId             | TEXT     | `.as_str()`                                |
//! | RunId              | TEXT     | UUID string via `.to_string()` / `FromStr` |
//! | PathBuf            | TEXT     | `to_string_lossy()`                        |
//! | DateTime<Utc>      | TEXT     | ISO 8601 via `to_rfc3339()`                |
//! | RunStatus          | TEXT     | plain string, `error:<message>` for errors |
//! | DiscoverySnapshot  | TEXT     | serde_json serialization                   |
//! | active item ids    | TEXT     | serde_json array                           |

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use lnxphotos_core::domain::{
    DiscoverySnapshot, LedgerEntry, MediaItemId, RunId, RunStatus, SyncRunState, UserId,
};
use lnxphotos_core::ports::{ILedgerStore, IRunStateStore, ISnapshotStore};

use crate::CacheError;

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Serialize a RunStatus to a string for storage
///
/// The Error variant is stored as "error:<message>".
fn run_status_to_string(status: &RunStatus) -> String {
    match status {
        RunStatus::Idle => "idle".to_string(),
        RunStatus::Running => "running".to_string(),
        RunStatus::Paused => "paused".to_string(),
        RunStatus::Cancelled => "cancelled".to_string(),
        RunStatus::Completed => "completed".to_string(),
        RunStatus::Error(msg) => format!("error:{}", msg),
    }
}

/// Deserialize a RunStatus from its stored string representation
fn run_status_from_string(s: &str) -> Result<RunStatus, CacheError> {
    match s {
        "idle" => Ok(RunStatus::Idle),
        "running" => Ok(RunStatus::Running),
        "paused" => Ok(RunStatus::Paused),
        "cancelled" => Ok(RunStatus::Cancelled),
        "completed" => Ok(RunStatus::Completed),
        s if s.starts_with("error:") => Ok(RunStatus::Error(s[6..].to_string())),
        other => Err(CacheError::SerializationError(format!(
            "Unknown run status: {}",
            other
        ))),
    }
}

/// Parse a DateTime<Utc> from an RFC 3339 or SQLite-formatted string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
                .map(|ndt| ndt.and_utc())
        })
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CacheError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

fn count_to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn count_from_i64(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn ledger_entry_from_row(row: &SqliteRow) -> Result<LedgerEntry, CacheError> {
    let item_id: String = row.get("item_id");
    let synced: bool = row.get("synced");
    let local_path: Option<String> = row.get("local_path");
    let last_attempt: String = row.get("last_attempt");
    let last_error: Option<String> = row.get("last_error");
    let attempts: i64 = row.get("attempts");

    Ok(LedgerEntry {
        item_id: MediaItemId::new(item_id)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?,
        synced,
        local_path: local_path.filter(|p| !p.is_empty()).map(PathBuf::from),
        last_attempt: parse_datetime(&last_attempt)?,
        last_error,
        attempts: u32::try_from(attempts).unwrap_or(0),
    })
}

fn run_state_from_row(row: &SqliteRow) -> Result<SyncRunState, CacheError> {
    let run_id: Option<String> = row.get("run_id");
    let status: String = row.get("status");
    let active_item_ids: String = row.get("active_item_ids");
    let started_at: Option<String> = row.get("started_at");
    let finished_at: Option<String> = row.get("finished_at");

    let run_id = run_id
        .map(|id| RunId::from_str(&id))
        .transpose()
        .map_err(|e| CacheError::SerializationError(format!("Invalid run id: {}", e)))?;

    let active_item_ids: BTreeSet<MediaItemId> = serde_json::from_str(&active_item_ids)
        .map_err(|e| CacheError::SerializationError(format!("Invalid active item ids: {}", e)))?;

    Ok(SyncRunState {
        run_id,
        status: run_status_from_string(&status)?,
        total_items: count_from_i64(row.get("total_items")),
        processed_items: count_from_i64(row.get("processed_items")),
        active_item_ids,
        downloaded: count_from_i64(row.get("downloaded")),
        skipped: count_from_i64(row.get("skipped")),
        failed: count_from_i64(row.get("failed")),
        started_at: parse_optional_datetime(started_at)?,
        finished_at: parse_optional_datetime(finished_at)?,
    })
}

// ============================================================================
// SqliteLedgerStore
// ============================================================================

/// SQLite-backed [`ILedgerStore`]
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ILedgerStore for SqliteLedgerStore {
    async fn load_entries(&self) -> anyhow::Result<Vec<LedgerEntry>> {
        let rows = sqlx::query("SELECT * FROM ledger_entries ORDER BY item_id")
            .fetch_all(&self.pool)
            .await?;

        let entries = rows
            .iter()
            .map(ledger_entry_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::trace!(count = entries.len(), "Loaded ledger entries");
        Ok(entries)
    }

    async fn save_entries(&self, entries: &[LedgerEntry]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM ledger_entries")
            .execute(&mut *tx)
            .await?;

        for entry in entries {
            let local_path = entry
                .local_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned());

            sqlx::query(
                "INSERT OR REPLACE INTO ledger_entries \
                 (item_id, synced, local_path, last_attempt, last_error, attempts) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(entry.item_id.as_str())
            .bind(entry.synced)
            .bind(&local_path)
            .bind(entry.last_attempt.to_rfc3339())
            .bind(&entry.last_error)
            .bind(i64::from(entry.attempts))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::trace!(count = entries.len(), "Saved ledger entries");
        Ok(())
    }
}

// ============================================================================
// SqliteSnapshotStore
// ============================================================================

/// SQLite-backed [`ISnapshotStore`]
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ISnapshotStore for SqliteSnapshotStore {
    async fn load_snapshot(&self, user: &UserId) -> anyhow::Result<Option<DiscoverySnapshot>> {
        let row = sqlx::query("SELECT snapshot FROM discovery_snapshots WHERE user_id = ?")
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => {
                let json: String = r.get("snapshot");
                let snapshot = serde_json::from_str(&json).map_err(|e| {
                    CacheError::SerializationError(format!("Invalid snapshot JSON: {}", e))
                })?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    async fn save_snapshot(
        &self,
        user: &UserId,
        snapshot: &DiscoverySnapshot,
    ) -> anyhow::Result<()> {
        let json = serde_json::to_string(snapshot)
            .map_err(|e| anyhow::anyhow!("Failed to serialize snapshot: {}", e))?;

        sqlx::query(
            "INSERT OR REPLACE INTO discovery_snapshots (user_id, snapshot, saved_at) \
             VALUES (?, ?, ?)",
        )
        .bind(user.as_str())
        .bind(&json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::trace!(
            user = %user,
            items = snapshot.total_items,
            "Saved discovery snapshot"
        );
        Ok(())
    }

    async fn clear_snapshot(&self, user: &UserId) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM discovery_snapshots WHERE user_id = ?")
            .bind(user.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ============================================================================
// SqliteRunStateStore
// ============================================================================

/// SQLite-backed [`IRunStateStore`]
pub struct SqliteRunStateStore {
    pool: SqlitePool,
}

impl SqliteRunStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl IRunStateStore for SqliteRunStateStore {
    async fn load_run_state(&self) -> anyhow::Result<Option<SyncRunState>> {
        let row = sqlx::query("SELECT * FROM sync_run_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(run_state_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn save_run_state(&self, state: &SyncRunState) -> anyhow::Result<()> {
        let active_item_ids = serde_json::to_string(&state.active_item_ids)
            .map_err(|e| anyhow::anyhow!("Failed to serialize active item ids: {}", e))?;

        sqlx::query(
            "INSERT OR REPLACE INTO sync_run_state \
             (id, run_id, status, total_items, processed_items, active_item_ids, \
              downloaded, skipped, failed, started_at, finished_at) \
             VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(state.run_id.map(|id| id.to_string()))
        .bind(run_status_to_string(&state.status))
        .bind(count_to_i64(state.total_items))
        .bind(count_to_i64(state.processed_items))
        .bind(&active_item_ids)
        .bind(count_to_i64(state.downloaded))
        .bind(count_to_i64(state.skipped))
        .bind(count_to_i64(state.failed))
        .bind(state.started_at.map(|dt| dt.to_rfc3339()))
        .bind(state.finished_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        tracing::trace!(status = %state.status, "Saved run state");
        Ok(())
    }
}
