//! Download orchestrator
//!
//! The [`DownloadOrchestrator`] drives one download run over a discovered
//! item set. A single coordinating loop owns the [`SyncRunState`], decides
//! per item whether to skip, adopt an existing file or download, and hands
//! downloads to a bounded pool of tasks.
//!
//! ## Run Flow
//!
//! 1. **Schedule**: for each item, reap finished tasks, honour pause and
//!    cancel, then decide (type filter, ledger, content signature, download).
//!    The sync directory is listed once up front for the signature checks.
//! 2. **Drain**: wait for every in-flight download
//! 3. **Cleanup**: on a full completion, optionally remove local files whose
//!    item is no longer in the catalog
//!
//! ## Retry Logic
//!
//! Transient network and integrity failures are retried with a fixed delay
//! up to `max_attempts` attempts. Nothing is retried once the run is
//! cancelled.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lnxphotos_core::config::SyncConfig;
use lnxphotos_core::domain::{
    LocalFileSignature, MediaItem, MediaItemId, MediaType, RunStatus, SyncRunState,
    PARTIAL_SUFFIX,
};
use lnxphotos_core::ports::{AuthContext, ICatalogProvider, ILocalFileSystem, IRunStateStore};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{self, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::broadcaster::ProgressBroadcaster;
use crate::control::RunControl;
use crate::ledger::{LocalFileIndex, SyncLedger};
use crate::SyncError;

// ============================================================================
// OrchestratorConfig
// ============================================================================

/// Tunables for a download run
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Attempts per item, including the first
    pub max_attempts: u32,
    /// Fixed delay between attempts of the same item
    pub retry_delay: Duration,
    pub include_photos: bool,
    pub include_videos: bool,
    /// Delete local files for items that left the catalog
    pub remove_missing: bool,
    /// Upper bound between pause re-checks
    pub pause_poll: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            include_photos: true,
            include_videos: true,
            remove_missing: false,
            pause_poll: Duration::from_millis(500),
        }
    }
}

impl From<&SyncConfig> for OrchestratorConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            retry_delay: config.retry_delay(),
            include_photos: config.include_photos,
            include_videos: config.include_videos,
            remove_missing: config.remove_missing,
            pause_poll: config.pause_poll(),
        }
    }
}

impl OrchestratorConfig {
    fn includes(&self, media_type: MediaType) -> bool {
        match media_type {
            MediaType::Photo => self.include_photos,
            MediaType::Video => self.include_videos,
        }
    }
}

// ============================================================================
// Download task
// ============================================================================

/// Result of one item's download task
#[derive(Debug)]
struct ItemOutcome {
    id: MediaItemId,
    result: Result<PathBuf, SyncError>,
}

/// What a download task hands back. The permit travels with the outcome so
/// a slot only frees up once the coordinator has accounted for the result.
type TaskOutput = (ItemOutcome, OwnedSemaphorePermit);

/// A joined task, or the item whose task died without an outcome
type Joined = Result<TaskOutput, (Option<MediaItemId>, JoinError)>;

/// Download tasks in flight, remembering which item each one serves
#[derive(Default)]
struct InFlight {
    tasks: JoinSet<TaskOutput>,
    items: HashMap<task::Id, MediaItemId>,
}

impl InFlight {
    fn spawn<F>(&mut self, item: MediaItemId, download: F)
    where
        F: Future<Output = TaskOutput> + Send + 'static,
    {
        let handle = self.tasks.spawn(download);
        self.items.insert(handle.id(), item);
    }

    fn try_next(&mut self) -> Option<Joined> {
        let joined = self.tasks.try_join_next_with_id()?;
        Some(self.settle(joined))
    }

    async fn next(&mut self) -> Option<Joined> {
        let joined = self.tasks.join_next_with_id().await?;
        Some(self.settle(joined))
    }

    fn settle(&mut self, joined: Result<(task::Id, TaskOutput), JoinError>) -> Joined {
        match joined {
            Ok((id, output)) => {
                self.items.remove(&id);
                Ok(output)
            }
            Err(e) => Err((self.items.remove(&e.id()), e)),
        }
    }

    fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Everything a download task needs, cloned out of the orchestrator
#[derive(Clone)]
struct Transfer {
    provider: Arc<dyn ICatalogProvider>,
    fs: Arc<dyn ILocalFileSystem>,
    ledger: Arc<SyncLedger>,
    max_attempts: u32,
    retry_delay: Duration,
    cancel: CancellationToken,
}

impl Transfer {
    /// Downloads `item` with retries and records the outcome in the ledger
    #[instrument(skip_all, fields(item_id = %item.id()))]
    async fn run(self, auth: AuthContext, item: MediaItem, sync_dir: PathBuf) -> ItemOutcome {
        let final_path = sync_dir.join(item.local_file_name());
        let mut attempt = 0;

        let result = loop {
            attempt += 1;
            match self.attempt(&auth, &item, &final_path).await {
                Ok(bytes) => {
                    debug!(attempt, bytes, "Download complete");
                    break Ok(final_path.clone());
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    if self.cancel.is_cancelled() {
                        break Err(e);
                    }
                    warn!(attempt, max_attempts = self.max_attempts, error = %e, "Download failed, retrying");
                    tokio::select! {
                        _ = self.cancel.cancelled() => break Err(e),
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
                Err(e) => break Err(e),
            }
        };

        match &result {
            Ok(path) => self.ledger.record_success(item.id(), path),
            Err(e) => {
                warn!(attempts = attempt, error = %e, "Download failed");
                self.ledger.record_failure(item.id(), e.to_string());
            }
        }

        ItemOutcome {
            id: item.id().clone(),
            result,
        }
    }

    /// One attempt: stream to a partial file, verify, rename into place
    async fn attempt(
        &self,
        auth: &AuthContext,
        item: &MediaItem,
        final_path: &Path,
    ) -> Result<u64, SyncError> {
        let partial = partial_path(final_path);

        let mut body = self.provider.open_download(auth, item).await?;
        let expected = body.content_length();
        let written = self.fs.write_stream(&partial, body.as_mut()).await?;

        if let Err(e) = verify_length(written, expected) {
            self.discard(&partial).await;
            return Err(e);
        }

        if let Err(e) = self.fs.rename(&partial, final_path).await {
            self.discard(&partial).await;
            return Err(SyncError::Storage(format!(
                "failed to move download into {}: {e}",
                final_path.display()
            )));
        }

        Ok(written)
    }

    async fn discard(&self, partial: &Path) {
        if let Err(e) = self.fs.delete_file(partial).await {
            warn!(path = %partial.display(), error = %e, "Failed to remove partial download");
        }
    }
}

fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Checks a finished stream against the advertised length
fn verify_length(written: u64, expected: Option<u64>) -> Result<(), SyncError> {
    if written == 0 {
        return Err(SyncError::Integrity("download was empty".into()));
    }
    match expected {
        Some(expected) if expected > 0 && expected != written => Err(SyncError::Integrity(
            format!("expected {expected} bytes, received {written}"),
        )),
        _ => Ok(()),
    }
}

// ============================================================================
// DownloadOrchestrator
// ============================================================================

/// Per-item scheduling decision, made before any download slot is taken
#[derive(Debug, PartialEq, Eq)]
enum Decision {
    /// Counted as processed, nothing else happens
    Skip(&'static str),
    /// An existing file is adopted into the ledger
    Adopt(PathBuf),
    Download,
}

/// Runs downloads for a discovered item set
pub struct DownloadOrchestrator {
    provider: Arc<dyn ICatalogProvider>,
    fs: Arc<dyn ILocalFileSystem>,
    ledger: Arc<SyncLedger>,
    run_states: Arc<dyn IRunStateStore>,
    broadcaster: Arc<ProgressBroadcaster>,
    config: OrchestratorConfig,
}

impl DownloadOrchestrator {
    pub fn new(
        provider: Arc<dyn ICatalogProvider>,
        fs: Arc<dyn ILocalFileSystem>,
        ledger: Arc<SyncLedger>,
        run_states: Arc<dyn IRunStateStore>,
        broadcaster: Arc<ProgressBroadcaster>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            fs,
            ledger,
            run_states,
            broadcaster,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<SyncLedger> {
        &self.ledger
    }

    /// Runs one download pass over `items` into `sync_dir`.
    ///
    /// At most `concurrency` downloads are in flight at any moment. The
    /// returned state is always terminal: `Completed`, `Cancelled`, or
    /// `Error` when the run itself could not go on (unusable sync directory,
    /// rejected credentials). Per-item failures only show up in the
    /// counters and the ledger.
    ///
    /// `items` is taken to be the whole catalog: with `remove_missing` set,
    /// anything local that is not among them is deleted after a completed
    /// run.
    pub async fn run(
        &self,
        auth: &AuthContext,
        items: &[MediaItem],
        sync_dir: &Path,
        concurrency: usize,
        control: RunControl,
    ) -> SyncRunState {
        self.run_pass(auth, items, sync_dir, concurrency, control, true)
            .await
    }

    /// Like [`run`](Self::run) for a partial listing of the catalog.
    ///
    /// Never removes anything, whatever `remove_missing` says.
    pub async fn run_partial(
        &self,
        auth: &AuthContext,
        items: &[MediaItem],
        sync_dir: &Path,
        concurrency: usize,
        control: RunControl,
    ) -> SyncRunState {
        self.run_pass(auth, items, sync_dir, concurrency, control, false)
            .await
    }

    #[instrument(skip_all, fields(items = items.len(), dir = %sync_dir.display(), concurrency = concurrency))]
    async fn run_pass(
        &self,
        auth: &AuthContext,
        items: &[MediaItem],
        sync_dir: &Path,
        concurrency: usize,
        mut control: RunControl,
        catalog_complete: bool,
    ) -> SyncRunState {
        let concurrency = concurrency.max(1);
        let mut state = SyncRunState::begin(items.len());
        info!(run_id = ?state.run_id, "Sync run started");
        self.persist(&state).await;

        if let Err(e) = self.fs.create_directory(sync_dir).await {
            error!(error = %e, "Sync directory unusable");
            let reason = format!("cannot create sync directory {}: {e}", sync_dir.display());
            return self.finish(state, RunStatus::Error(reason)).await;
        }

        let on_disk = self.ledger.index_directory(sync_dir).await;
        debug!(files = on_disk.len(), "Indexed sync directory");

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut tasks = InFlight::default();
        let mut seen: HashSet<&MediaItemId> = HashSet::with_capacity(items.len());
        let mut abort: Option<String> = None;

        for item in items {
            while let Some(joined) = tasks.try_next() {
                self.apply(&mut state, joined, &mut abort);
            }
            if !self
                .ready_to_schedule(&mut state, &mut control, &mut tasks, &mut abort)
                .await
            {
                break;
            }

            if !seen.insert(item.id()) {
                self.count_skip(&mut state, item, "duplicate id");
                continue;
            }

            match self.decide(item, &on_disk).await {
                Decision::Skip(reason) => {
                    self.count_skip(&mut state, item, reason);
                    continue;
                }
                Decision::Adopt(path) => {
                    debug!(item_id = %item.id(), path = %path.display(), "Adopting existing file");
                    self.ledger.record_success(item.id(), path);
                    self.count_skip(&mut state, item, "already on disk");
                    continue;
                }
                Decision::Download => {}
            }

            let permit = loop {
                if let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() {
                    break Some(permit);
                }
                match tasks.next().await {
                    Some(joined) => self.apply(&mut state, joined, &mut abort),
                    // Nothing in flight holds a slot; only a closed semaphore lands here
                    None => break Arc::clone(&semaphore).acquire_owned().await.ok(),
                }
            };
            let Some(permit) = permit else {
                abort.get_or_insert_with(|| "download slots unavailable".into());
                break;
            };

            // Completions applied while waiting may have changed the picture
            if !self
                .ready_to_schedule(&mut state, &mut control, &mut tasks, &mut abort)
                .await
            {
                break;
            }

            self.ledger.record_attempt_start(item.id());
            state.active_item_ids.insert(item.id().clone());
            self.broadcaster.publish_sync(&state);

            let transfer = self.transfer(control.cancel_token());
            let auth = auth.clone();
            let item = item.clone();
            let dir = sync_dir.to_path_buf();
            tasks.spawn(item.id().clone(), async move {
                (transfer.run(auth, item, dir).await, permit)
            });
        }

        while let Some(joined) = tasks.next().await {
            self.apply(&mut state, joined, &mut abort);
        }

        let status = if let Some(reason) = abort {
            RunStatus::Error(reason)
        } else if control.is_cancelled() {
            RunStatus::Cancelled
        } else {
            if self.config.remove_missing {
                if catalog_complete {
                    self.remove_missing(items, sync_dir).await;
                } else {
                    info!("Catalog listing incomplete, leaving local files in place");
                }
            }
            RunStatus::Completed
        };

        self.finish(state, status).await
    }

    /// Decides what to do with `item`. Only reads the ledger and the disk.
    async fn decide(&self, item: &MediaItem, on_disk: &LocalFileIndex) -> Decision {
        if !self.config.includes(item.media_type()) {
            return Decision::Skip("media type excluded");
        }
        if self.ledger.is_synced(item.id()).await {
            return Decision::Skip("already synced");
        }
        match self.ledger.find_by_content_signature(item, on_disk).await {
            Some(path) => Decision::Adopt(path),
            None => Decision::Download,
        }
    }

    /// Whether a new item may be scheduled now, waiting out a pause first.
    ///
    /// False once the run is cancelled or aborted, including an abort that
    /// arrives during the pause.
    async fn ready_to_schedule(
        &self,
        state: &mut SyncRunState,
        control: &mut RunControl,
        tasks: &mut InFlight,
        abort: &mut Option<String>,
    ) -> bool {
        if abort.is_some() || control.is_cancelled() {
            return false;
        }
        if !control.is_paused() {
            return true;
        }

        self.set_status(state, RunStatus::Paused).await;
        info!(processed = state.processed_items, "Sync run paused");

        let resumed = loop {
            tokio::select! {
                resumed = control.wait_while_paused(self.config.pause_poll) => break resumed,
                Some(joined) = tasks.next(), if !tasks.is_empty() => {
                    self.apply(state, joined, abort);
                    if abort.is_some() {
                        break false;
                    }
                }
            }
        };

        if !resumed {
            return false;
        }
        self.set_status(state, RunStatus::Running).await;
        info!("Sync run resumed");
        abort.is_none()
    }

    /// Folds one finished download task into the run state
    fn apply(
        &self,
        state: &mut SyncRunState,
        joined: Joined,
        abort: &mut Option<String>,
    ) {
        state.processed_items += 1;
        match joined {
            Ok((ItemOutcome { id, result }, _slot)) => {
                state.active_item_ids.remove(&id);
                match result {
                    Ok(_) => state.downloaded += 1,
                    Err(e) => {
                        state.failed += 1;
                        if e.is_auth() && abort.is_none() {
                            warn!(item_id = %id, error = %e, "Credentials rejected, stopping run");
                            *abort = Some(e.to_string());
                        }
                    }
                }
            }
            Err((item, e)) => {
                error!(item_id = ?item, error = %e, "Download task died");
                state.failed += 1;
                if let Some(id) = item {
                    state.active_item_ids.remove(&id);
                    self.ledger.record_failure(&id, format!("download task died: {e}"));
                }
            }
        }
        self.broadcaster.publish_sync(state);
    }

    fn count_skip(&self, state: &mut SyncRunState, item: &MediaItem, reason: &str) {
        debug!(item_id = %item.id(), reason, "Skipping item");
        state.skipped += 1;
        state.processed_items += 1;
        self.broadcaster.publish_sync(state);
    }

    fn transfer(&self, cancel: &CancellationToken) -> Transfer {
        Transfer {
            provider: Arc::clone(&self.provider),
            fs: Arc::clone(&self.fs),
            ledger: Arc::clone(&self.ledger),
            max_attempts: self.config.max_attempts.max(1),
            retry_delay: self.config.retry_delay,
            cancel: cancel.clone(),
        }
    }

    /// Deletes local files and ledger entries for items no longer listed
    async fn remove_missing(&self, items: &[MediaItem], sync_dir: &Path) {
        let remote_ids: HashSet<MediaItemId> = items.iter().map(|i| i.id().clone()).collect();
        let remote_suffixes: HashSet<String> = items.iter().map(|i| i.id().suffix()).collect();

        let files = match self.fs.list_directory(sync_dir).await {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "Could not list sync directory, skipping cleanup");
                return;
            }
        };

        let mut deleted = 0usize;
        for path in files {
            let Some(signature) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(LocalFileSignature::parse)
            else {
                continue;
            };
            if remote_suffixes.contains(&signature.id_suffix) {
                continue;
            }
            match self.fs.delete_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed file no longer in catalog");
                    deleted += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove file"),
            }
        }

        let dropped = self.ledger.retain_ids(&remote_ids);
        info!(files = deleted, ledger_entries = dropped, "Removed items missing from catalog");
    }

    async fn set_status(&self, state: &mut SyncRunState, status: RunStatus) {
        if let Err(e) = state.transition(status) {
            warn!(error = %e, "Ignoring run status change");
            return;
        }
        self.persist(state).await;
    }

    async fn finish(&self, mut state: SyncRunState, status: RunStatus) -> SyncRunState {
        if let Err(e) = state.transition(status) {
            warn!(error = %e, "Unexpected final run status");
        }
        info!(
            status = %state.status,
            processed = state.processed_items,
            downloaded = state.downloaded,
            skipped = state.skipped,
            failed = state.failed,
            "Sync run finished"
        );
        self.persist(&state).await;
        state
    }

    /// Saves the run state and publishes it
    async fn persist(&self, state: &SyncRunState) {
        if let Err(e) = self.run_states.save_run_state(state).await {
            warn!(error = %e, "Failed to persist run state");
        }
        self.broadcaster.publish_sync(state);
    }
}

// ============================================================================
// Unit tests
// ============================================================================
