//! Sync ledger
//!
//! Records, per remote item id, whether the item has a verified local copy
//! and what happened on the last download attempt. The ledger is the only
//! mutable state shared by concurrent download tasks; it is a single coarse
//! lock around a map, written through to an [`ILedgerStore`] on an interval
//! and on shutdown.
//!
//! Entries are re-verified lazily: [`SyncLedger::is_synced`] checks that the
//! recorded file still exists and downgrades the entry when it does not.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use lnxphotos_core::domain::{LedgerEntry, LedgerStats, LocalFileSignature, MediaItem, MediaItemId};
use lnxphotos_core::ports::{ILedgerStore, ILocalFileSystem};

/// Files of a sync directory keyed by the signature in their names.
///
/// Built once per run so matching an item against the directory does not
/// re-list it. Names without a signature are left out.
#[derive(Debug, Default)]
pub struct LocalFileIndex {
    by_signature: HashMap<LocalFileSignature, PathBuf>,
}

impl LocalFileIndex {
    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut by_signature = HashMap::new();
        for path in paths {
            let signature = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(LocalFileSignature::parse);
            if let Some(signature) = signature {
                by_signature.entry(signature).or_insert(path);
            }
        }
        Self { by_signature }
    }

    pub fn get(&self, signature: &LocalFileSignature) -> Option<&Path> {
        self.by_signature.get(signature).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.by_signature.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_signature.is_empty()
    }
}

/// Persistent record of per-item sync outcomes
pub struct SyncLedger {
    entries: Mutex<HashMap<MediaItemId, LedgerEntry>>,
    dirty: AtomicBool,
    store: Arc<dyn ILedgerStore>,
    fs: Arc<dyn ILocalFileSystem>,
}

impl SyncLedger {
    /// Loads the ledger from `store`.
    ///
    /// A store that cannot be read does not prevent startup: the ledger starts
    /// empty and the failure is logged. The next flush overwrites it.
    pub async fn open(store: Arc<dyn ILedgerStore>, fs: Arc<dyn ILocalFileSystem>) -> Self {
        let entries = match store.load_entries().await {
            Ok(entries) => {
                info!(count = entries.len(), "Ledger loaded");
                entries
                    .into_iter()
                    .map(|entry| (entry.item_id.clone(), entry))
                    .collect()
            }
            Err(e) => {
                warn!(error = %e, "Ledger store unreadable, starting with an empty ledger");
                HashMap::new()
            }
        };

        Self {
            entries: Mutex::new(entries),
            dirty: AtomicBool::new(false),
            store,
            fs,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<MediaItemId, LedgerEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn get(&self, id: &MediaItemId) -> Option<LedgerEntry> {
        self.lock().get(id).cloned()
    }

    /// Overwrites the entry for `entry.item_id`, stamping `last_attempt` now
    pub fn put(&self, mut entry: LedgerEntry) {
        entry.last_attempt = Utc::now();
        self.lock().insert(entry.item_id.clone(), entry);
        self.mark_dirty();
    }

    /// Records that a download of `id` is starting
    pub fn record_attempt_start(&self, id: &MediaItemId) {
        let mut entries = self.lock();
        let entry = entries
            .entry(id.clone())
            .or_insert_with(|| LedgerEntry::attempt_started(id.clone()));
        entry.synced = false;
        entry.local_path = None;
        entry.attempts = entry.attempts.saturating_add(1);
        entry.last_attempt = Utc::now();
        drop(entries);
        self.mark_dirty();
    }

    /// Records a verified local copy of `id` at `path`
    pub fn record_success(&self, id: &MediaItemId, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut entries = self.lock();
        let entry = entries
            .entry(id.clone())
            .or_insert_with(|| LedgerEntry::attempt_started(id.clone()));
        entry.synced = true;
        entry.local_path = Some(path);
        entry.last_error = None;
        entry.last_attempt = Utc::now();
        drop(entries);
        self.mark_dirty();
    }

    /// Records a failed download of `id`
    pub fn record_failure(&self, id: &MediaItemId, error: impl Into<String>) {
        let error = error.into();
        let mut entries = self.lock();
        let entry = entries
            .entry(id.clone())
            .or_insert_with(|| LedgerEntry::attempt_started(id.clone()));
        entry.synced = false;
        entry.local_path = None;
        entry.last_error = Some(error);
        entry.last_attempt = Utc::now();
        drop(entries);
        self.mark_dirty();
    }

    /// Whether `id` has a synced entry whose file is still on disk.
    ///
    /// An entry whose file has disappeared is downgraded in place: its path
    /// is cleared and `synced` reset, the entry itself is kept.
    pub async fn is_synced(&self, id: &MediaItemId) -> bool {
        let path = match self.lock().get(id) {
            Some(entry) if entry.synced => match &entry.local_path {
                Some(path) => path.clone(),
                None => return false,
            },
            _ => return false,
        };

        if self.file_exists(&path).await {
            return true;
        }

        debug!(item_id = %id, path = %path.display(), "Synced file vanished, clearing entry");
        let cleared = match self.lock().get_mut(id) {
            // Skip if a concurrent writer already replaced the path
            Some(entry) if entry.local_path.as_deref() == Some(path.as_path()) => {
                entry.synced = false;
                entry.local_path = None;
                true
            }
            _ => false,
        };
        if cleared {
            self.mark_dirty();
        }
        false
    }

    /// Lists `directory` once and indexes the files by naming signature.
    ///
    /// An unreadable directory gives an empty index.
    pub async fn index_directory(&self, directory: &Path) -> LocalFileIndex {
        match self.fs.list_directory(directory).await {
            Ok(files) => LocalFileIndex::from_paths(files),
            Err(e) => {
                warn!(dir = %directory.display(), error = %e, "Could not scan sync directory");
                LocalFileIndex::default()
            }
        }
    }

    /// Finds an existing local copy of `item`.
    ///
    /// The ledger's recorded path wins when it still exists. Otherwise
    /// `index` is consulted for a file carrying the same creation timestamp
    /// and id suffix in its name.
    pub async fn find_by_content_signature(
        &self,
        item: &MediaItem,
        index: &LocalFileIndex,
    ) -> Option<PathBuf> {
        let recorded = self.lock().get(item.id()).and_then(|e| e.local_path.clone());
        if let Some(path) = recorded {
            if self.file_exists(&path).await {
                return Some(path);
            }
        }

        let signature = LocalFileSignature::of(item)?;
        let path = index.get(&signature)?;
        // The index may predate a deletion
        self.file_exists(path).await.then(|| path.to_path_buf())
    }

    async fn file_exists(&self, path: &Path) -> bool {
        match self.fs.get_state(path).await {
            Ok(state) => state.is_regular_file(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not stat ledger path");
                false
            }
        }
    }

    pub fn remove(&self, id: &MediaItemId) -> Option<LedgerEntry> {
        let removed = self.lock().remove(id);
        if removed.is_some() {
            self.mark_dirty();
        }
        removed
    }

    /// Drops every entry whose id is not in `keep`; returns how many went
    pub fn retain_ids(&self, keep: &HashSet<MediaItemId>) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|id, _| keep.contains(id));
        let removed = before - entries.len();
        drop(entries);
        if removed > 0 {
            self.mark_dirty();
        }
        removed
    }

    /// All entries, ordered by item id
    pub fn entries(&self) -> Vec<LedgerEntry> {
        let mut entries: Vec<_> = self.lock().values().cloned().collect();
        entries.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        entries
    }

    /// Entries whose last attempt failed
    pub fn failures(&self) -> Vec<LedgerEntry> {
        let mut failed: Vec<_> = self.entries().into_iter().filter(LedgerEntry::is_failed).collect();
        failed.sort_by(|a, b| b.last_attempt.cmp(&a.last_attempt));
        failed
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats::from_entries(self.lock().values())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Writes the full mapping to the store if anything changed.
    ///
    /// On failure the ledger stays dirty so the next flush retries.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> anyhow::Result<()> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let entries = self.entries();
        if let Err(e) = self.store.save_entries(&entries).await {
            self.mark_dirty();
            return Err(e);
        }

        debug!(count = entries.len(), "Ledger flushed");
        Ok(())
    }

    /// Flushes every `interval` until `shutdown` fires, then flushes once more
    pub fn spawn_periodic_flush(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let ledger = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = ledger.flush().await {
                            warn!(error = %e, "Periodic ledger flush failed");
                        }
                    }
                }
            }

            if let Err(e) = ledger.flush().await {
                warn!(error = %e, "Final ledger flush failed");
            }
            debug!("Ledger flusher stopped");
        })
    }
}
