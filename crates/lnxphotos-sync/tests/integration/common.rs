//! Shared fixtures: an in-memory catalog and in-memory stores

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use lnxphotos_core::domain::{
    DiscoverySnapshot, LedgerEntry, MediaItem, MediaItemId, MediaType, PageToken, SyncRunState,
    UserId,
};
use lnxphotos_core::ports::{
    AuthContext, CatalogPage, DownloadBody, FileSystemState, ICatalogProvider, ILedgerStore,
    ILocalFileSystem, IRunStateStore, ISnapshotStore, ProviderError, StreamWriteError,
};
use lnxphotos_sync::broadcaster::ProgressBroadcaster;
use lnxphotos_sync::discovery::DiscoveryEngine;
use lnxphotos_sync::filesystem::LocalFileSystemAdapter;
use lnxphotos_sync::ledger::SyncLedger;
use lnxphotos_sync::orchestrator::{DownloadOrchestrator, OrchestratorConfig};
use lnxphotos_sync::service::PhotoSyncService;

// ============================================================================
// Items
// ============================================================================

pub fn id(s: &str) -> MediaItemId {
    MediaItemId::new(s.to_string()).unwrap()
}

pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

pub fn photo(item_id: &str, created: DateTime<Utc>) -> MediaItem {
    MediaItem::new(
        id(item_id),
        format!("IMG_{item_id}.jpg"),
        MediaType::Photo,
        format!("https://media.example.com/{item_id}=d"),
    )
    .with_creation_time(created)
}

pub fn video(item_id: &str, created: DateTime<Utc>) -> MediaItem {
    MediaItem::new(
        id(item_id),
        format!("VID_{item_id}.mp4"),
        MediaType::Video,
        format!("https://media.example.com/{item_id}=dv"),
    )
    .with_creation_time(created)
}

/// `count` photos one minute apart, ids `AF1Qitem0000`, `AF1Qitem0001`, ...
pub fn photos(count: usize) -> Vec<MediaItem> {
    (0..count)
        .map(|i| {
            let created = at(2024, 3, 1, 9, 0, 0) + chrono::Duration::minutes(i as i64);
            photo(&format!("AF1Qitem{i:04}"), created)
        })
        .collect()
}

pub fn auth() -> AuthContext {
    auth_for("user-1")
}

pub fn auth_for(user: &str) -> AuthContext {
    AuthContext::new(UserId::new(user.to_string()).unwrap(), "test-token")
}

pub fn content_of(item_id: &MediaItemId) -> Vec<u8> {
    format!("original bytes of {item_id}").into_bytes()
}

// ============================================================================
// FakeCatalog
// ============================================================================

/// Decrements the active-download gauge when the body is dropped
struct ActiveSlot(Arc<AtomicUsize>);

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct FakeBody {
    chunks: VecDeque<Vec<u8>>,
    advertised: Option<u64>,
    _slot: ActiveSlot,
}

#[async_trait::async_trait]
impl DownloadBody for FakeBody {
    fn content_length(&self) -> Option<u64> {
        self.advertised
    }

    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ProviderError> {
        Ok(self.chunks.pop_front())
    }
}

/// In-memory catalog paging by offset, with scripted download behaviour
pub struct FakeCatalog {
    items: Mutex<Vec<MediaItem>>,
    list_calls: AtomicUsize,
    list_delay: Mutex<Duration>,
    list_failure: Mutex<Option<(usize, ProviderError)>>,
    cancel_after_pages: Mutex<Option<(usize, CancellationToken)>>,
    download_calls: Mutex<Vec<MediaItemId>>,
    download_failures: Mutex<HashMap<MediaItemId, VecDeque<ProviderError>>>,
    truncated: Mutex<HashMap<MediaItemId, usize>>,
    panicking: Mutex<HashSet<MediaItemId>>,
    download_delay: Mutex<Duration>,
    gate: watch::Sender<bool>,
    active: Arc<AtomicUsize>,
    max_active: AtomicUsize,
}

impl FakeCatalog {
    pub fn new(items: Vec<MediaItem>) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            items: Mutex::new(items),
            list_calls: AtomicUsize::new(0),
            list_delay: Mutex::new(Duration::ZERO),
            list_failure: Mutex::new(None),
            cancel_after_pages: Mutex::new(None),
            download_calls: Mutex::new(Vec::new()),
            download_failures: Mutex::new(HashMap::new()),
            truncated: Mutex::new(HashMap::new()),
            panicking: Mutex::new(HashSet::new()),
            download_delay: Mutex::new(Duration::ZERO),
            gate,
            active: Arc::new(AtomicUsize::new(0)),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn set_items(&self, items: Vec<MediaItem>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = delay;
    }

    /// The `page`th list call (0-based) fails with `error`
    pub fn fail_list_call(&self, page: usize, error: ProviderError) {
        *self.list_failure.lock().unwrap() = Some((page, error));
    }

    /// Cancels `token` once `pages` pages have been served
    pub fn cancel_after_pages(&self, pages: usize, token: CancellationToken) {
        *self.cancel_after_pages.lock().unwrap() = Some((pages, token));
    }

    /// The next downloads of `item` fail with `errors`, in order
    pub fn fail_downloads(&self, item: &str, errors: Vec<ProviderError>) {
        self.download_failures
            .lock()
            .unwrap()
            .insert(id(item), errors.into());
    }

    /// Downloads of `item` advertise the full length but send only `bytes`
    pub fn truncate_downloads(&self, item: &str, bytes: usize) {
        self.truncated.lock().unwrap().insert(id(item), bytes);
    }

    /// Downloads of `item` panic inside the download task
    pub fn panic_on_download(&self, item: &str) {
        self.panicking.lock().unwrap().insert(id(item));
    }

    pub fn set_download_delay(&self, delay: Duration) {
        *self.download_delay.lock().unwrap() = delay;
    }

    /// Holds every download at its start until [`open_gate`](Self::open_gate)
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> Vec<MediaItemId> {
        self.download_calls.lock().unwrap().clone()
    }

    pub fn download_count(&self) -> usize {
        self.download_calls.lock().unwrap().len()
    }

    pub fn active_downloads(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open downloads seen
    pub fn max_active_downloads(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Waits until exactly `n` downloads are open, failing after two seconds
    pub async fn wait_for_active(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.active_downloads() != n {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("never reached {n} active downloads"));
    }
}

#[async_trait::async_trait]
impl ICatalogProvider for FakeCatalog {
    async fn list_page(
        &self,
        _auth: &AuthContext,
        page_size: u32,
        page_token: Option<&PageToken>,
    ) -> Result<CatalogPage, ProviderError> {
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.list_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some((page, error)) = self.list_failure.lock().unwrap().as_ref() {
            if *page == call {
                return Err(error.clone());
            }
        }

        let offset: usize = match page_token {
            Some(token) => token
                .as_str()
                .strip_prefix("offset-")
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| ProviderError::InvalidResponse("unknown page token".into()))?,
            None => 0,
        };

        let items = self.items.lock().unwrap().clone();
        let end = (offset + page_size as usize).min(items.len());
        let page_items = items[offset.min(end)..end].to_vec();
        let next_page_token = (end < items.len())
            .then(|| PageToken::new(format!("offset-{end}")).unwrap());

        if let Some((pages, token)) = self.cancel_after_pages.lock().unwrap().as_ref() {
            if call + 1 >= *pages {
                token.cancel();
            }
        }

        Ok(CatalogPage {
            items: page_items,
            next_page_token,
        })
    }

    async fn open_download(
        &self,
        _auth: &AuthContext,
        item: &MediaItem,
    ) -> Result<Box<dyn DownloadBody>, ProviderError> {
        self.download_calls.lock().unwrap().push(item.id().clone());

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        let slot = ActiveSlot(Arc::clone(&self.active));

        let mut gate = self.gate.subscribe();
        loop {
            let open = *gate.borrow_and_update();
            if open || gate.changed().await.is_err() {
                break;
            }
        }

        let delay = *self.download_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let panics = self.panicking.lock().unwrap().contains(item.id());
        if panics {
            panic!("scripted panic while opening {}", item.id());
        }

        let failure = self
            .download_failures
            .lock()
            .unwrap()
            .get_mut(item.id())
            .and_then(VecDeque::pop_front);
        if let Some(error) = failure {
            return Err(error);
        }

        let content = content_of(item.id());
        let advertised = Some(content.len() as u64);
        let sent = match self.truncated.lock().unwrap().get(item.id()) {
            Some(bytes) => content[..*bytes].to_vec(),
            None => content,
        };
        let chunks = sent.chunks(8).map(<[u8]>::to_vec).collect();

        Ok(Box::new(FakeBody {
            chunks,
            advertised,
            _slot: slot,
        }))
    }
}

// ============================================================================
// In-memory stores
// ============================================================================

#[derive(Default)]
pub struct MemoryLedgerStore {
    entries: Mutex<Vec<LedgerEntry>>,
    saves: AtomicUsize,
}

impl MemoryLedgerStore {
    pub fn saved(&self) -> Vec<LedgerEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ILedgerStore for MemoryLedgerStore {
    async fn load_entries(&self) -> anyhow::Result<Vec<LedgerEntry>> {
        Ok(self.entries.lock().unwrap().clone())
    }

    async fn save_entries(&self, entries: &[LedgerEntry]) -> anyhow::Result<()> {
        *self.entries.lock().unwrap() = entries.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<UserId, DiscoverySnapshot>>,
}

impl MemorySnapshotStore {
    pub fn get(&self, user: &str) -> Option<DiscoverySnapshot> {
        let user = UserId::new(user.to_string()).unwrap();
        self.snapshots.lock().unwrap().get(&user).cloned()
    }

    /// Pushes the stored snapshot's timestamp `age` into the past
    pub fn age(&self, user: &str, age: chrono::Duration) {
        let user = UserId::new(user.to_string()).unwrap();
        if let Some(snapshot) = self.snapshots.lock().unwrap().get_mut(&user) {
            snapshot.timestamp = snapshot.timestamp - age;
        }
    }
}

#[async_trait::async_trait]
impl ISnapshotStore for MemorySnapshotStore {
    async fn load_snapshot(&self, user: &UserId) -> anyhow::Result<Option<DiscoverySnapshot>> {
        Ok(self.snapshots.lock().unwrap().get(user).cloned())
    }

    async fn save_snapshot(&self, user: &UserId, snapshot: &DiscoverySnapshot) -> anyhow::Result<()> {
        self.snapshots
            .lock()
            .unwrap()
            .insert(user.clone(), snapshot.clone());
        Ok(())
    }

    async fn clear_snapshot(&self, user: &UserId) -> anyhow::Result<()> {
        self.snapshots.lock().unwrap().remove(user);
        Ok(())
    }
}

/// Keeps every saved run state, newest last
#[derive(Default)]
pub struct MemoryRunStateStore {
    history: Mutex<Vec<SyncRunState>>,
}

impl MemoryRunStateStore {
    pub fn history(&self) -> Vec<SyncRunState> {
        self.history.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<SyncRunState> {
        self.history.lock().unwrap().last().cloned()
    }
}

#[async_trait::async_trait]
impl IRunStateStore for MemoryRunStateStore {
    async fn load_run_state(&self) -> anyhow::Result<Option<SyncRunState>> {
        Ok(self.last())
    }

    async fn save_run_state(&self, state: &SyncRunState) -> anyhow::Result<()> {
        self.history.lock().unwrap().push(state.clone());
        Ok(())
    }
}

// ============================================================================
// CountingFileSystem
// ============================================================================

/// Real filesystem that counts directory listings
#[derive(Default)]
pub struct CountingFileSystem {
    inner: LocalFileSystemAdapter,
    listings: AtomicUsize,
}

impl CountingFileSystem {
    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ILocalFileSystem for CountingFileSystem {
    async fn create_directory(&self, path: &Path) -> anyhow::Result<()> {
        self.inner.create_directory(path).await
    }

    async fn write_stream(
        &self,
        path: &Path,
        body: &mut dyn DownloadBody,
    ) -> Result<u64, StreamWriteError> {
        self.inner.write_stream(path, body).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
        self.inner.rename(from, to).await
    }

    async fn delete_file(&self, path: &Path) -> anyhow::Result<()> {
        self.inner.delete_file(path).await
    }

    async fn list_directory(&self, path: &Path) -> anyhow::Result<Vec<PathBuf>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        self.inner.list_directory(path).await
    }

    async fn get_state(&self, path: &Path) -> anyhow::Result<FileSystemState> {
        self.inner.get_state(path).await
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Test configuration: no real waiting between retries or pause checks
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        max_attempts: 3,
        retry_delay: Duration::from_millis(1),
        pause_poll: Duration::from_millis(5),
        ..OrchestratorConfig::default()
    }
}

/// One sync setup over a temp directory and in-memory stores
pub struct Harness {
    pub dir: TempDir,
    pub catalog: Arc<FakeCatalog>,
    pub ledger_store: Arc<MemoryLedgerStore>,
    pub ledger: Arc<SyncLedger>,
    pub snapshots: Arc<MemorySnapshotStore>,
    pub run_states: Arc<MemoryRunStateStore>,
    pub broadcaster: Arc<ProgressBroadcaster>,
}

impl Harness {
    pub async fn new(items: Vec<MediaItem>) -> Self {
        let ledger_store = Arc::new(MemoryLedgerStore::default());
        let ledger = Arc::new(
            SyncLedger::open(ledger_store.clone(), Arc::new(LocalFileSystemAdapter::new())).await,
        );
        Self {
            dir: TempDir::new().unwrap(),
            catalog: Arc::new(FakeCatalog::new(items)),
            ledger_store,
            ledger,
            snapshots: Arc::new(MemorySnapshotStore::default()),
            run_states: Arc::new(MemoryRunStateStore::default()),
            broadcaster: Arc::new(ProgressBroadcaster::new()),
        }
    }

    pub fn sync_dir(&self) -> PathBuf {
        self.dir.path().join("library")
    }

    pub fn orchestrator(&self, config: OrchestratorConfig) -> DownloadOrchestrator {
        DownloadOrchestrator::new(
            self.catalog.clone(),
            Arc::new(LocalFileSystemAdapter::new()),
            self.ledger.clone(),
            self.run_states.clone(),
            self.broadcaster.clone(),
            config,
        )
    }

    pub fn discovery(&self, cache_ttl: Duration) -> DiscoveryEngine {
        DiscoveryEngine::new(
            self.catalog.clone(),
            self.snapshots.clone(),
            self.broadcaster.clone(),
            cache_ttl,
        )
    }

    pub fn service(&self, config: OrchestratorConfig) -> PhotoSyncService {
        PhotoSyncService::new(
            self.discovery(Duration::from_secs(3600)),
            self.orchestrator(config),
            self.run_states.clone(),
            self.broadcaster.clone(),
        )
    }

    /// Names of the files in the sync directory, sorted
    pub fn files(&self) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(self.sync_dir()) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}
