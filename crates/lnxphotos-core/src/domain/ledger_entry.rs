//! Sync ledger entries
//!
//! One [`LedgerEntry`] per media item that has ever been attempted. The
//! ledger in `lnxphotos-sync` is the only writer.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::MediaItemId;

/// Recorded outcome of the most recent download attempt for an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub item_id: MediaItemId,
    pub synced: bool,
    pub local_path: Option<PathBuf>,
    pub last_attempt: DateTime<Utc>,
    pub last_error: Option<String>,
    /// Number of recorded attempt results, successful or not
    pub attempts: u32,
}

impl LedgerEntry {
    /// Entry written when a download attempt begins
    pub fn attempt_started(item_id: MediaItemId) -> Self {
        Self {
            item_id,
            synced: false,
            local_path: None,
            last_attempt: Utc::now(),
            last_error: None,
            attempts: 0,
        }
    }

    /// Entry for an item present on disk at `path`
    pub fn synced(item_id: MediaItemId, path: impl Into<PathBuf>) -> Self {
        Self {
            item_id,
            synced: true,
            local_path: Some(path.into()),
            last_attempt: Utc::now(),
            last_error: None,
            attempts: 1,
        }
    }

    /// Entry for an item whose download failed with `error`
    pub fn failed(item_id: MediaItemId, error: impl Into<String>) -> Self {
        Self {
            item_id,
            synced: false,
            local_path: None,
            last_attempt: Utc::now(),
            last_error: Some(error.into()),
            attempts: 1,
        }
    }

    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }

    /// Whether the last attempt ended in an error
    pub fn is_failed(&self) -> bool {
        !self.synced && self.last_error.is_some()
    }
}

/// Aggregate counts over the whole ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total: usize,
    pub synced: usize,
    pub failed: usize,
}

impl LedgerStats {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Self {
        entries
            .into_iter()
            .fold(Self::default(), |mut stats, entry| {
                stats.total += 1;
                if entry.synced {
                    stats.synced += 1;
                }
                if entry.is_failed() {
                    stats.failed += 1;
                }
                stats
            })
    }
}
