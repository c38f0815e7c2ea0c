//! Catalog discovery engine
//!
//! Walks the remote catalog page by page and summarises it as a
//! [`DiscoverySnapshot`]. A single call fetches at most `max_pages` pages;
//! the returned continuation token lets a later call pick up where this one
//! stopped.
//!
//! ## Behaviour
//!
//! - Snapshots are cached per user and served while younger than the TTL,
//!   without touching the network, to requests of the same scope.
//! - The date filter is a post-pass over the fetched items and applies only
//!   when both bounds are given; undated items never pass it.
//! - Cancellation is checked before each page request.
//! - A failed page request is returned to the caller; nothing is retried
//!   here beyond the rate limiter's single 429 retry.
//! - Only one discovery runs at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lnxphotos_core::config::DiscoveryConfig;
use lnxphotos_core::domain::{DiscoverySnapshot, PageToken, UserId};
use lnxphotos_core::ports::{AuthContext, ICatalogProvider, ISnapshotStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::broadcaster::{DiscoveryProgress, ProgressBroadcaster};
use crate::SyncError;

/// Parameters of one discovery call
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub page_size: u32,
    /// Upper bound on page requests made by this call
    pub max_pages: u32,
    /// Token to start from instead of the beginning of the catalog
    pub page_token: Option<PageToken>,
    /// Inclusive lower bound on creation time
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on creation time
    pub end: Option<DateTime<Utc>>,
    /// Append to the cached snapshot instead of replacing it
    pub continue_previous: bool,
    /// Serve a fresh cached snapshot without fetching
    pub use_cache: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: 50,
            page_token: None,
            start: None,
            end: None,
            continue_previous: false,
            use_cache: true,
        }
    }
}

impl From<&DiscoveryConfig> for DiscoveryOptions {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            page_size: config.page_size,
            max_pages: config.max_pages_per_call,
            start: config.start_date,
            end: config.end_date,
            ..Self::default()
        }
    }
}

impl DiscoveryOptions {
    /// The date range, when both bounds are set
    fn date_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.start.zip(self.end)
    }

    /// Whether `cached` answers this request as well as a fetch would.
    ///
    /// The scope must match, and a listing that stopped early must have
    /// scanned at least as many pages as this call may request.
    fn served_by(&self, cached: &DiscoverySnapshot) -> bool {
        self.page_token.is_none()
            && !cached.started_mid_catalog
            && cached.date_range == self.date_range()
            && (!cached.has_more || cached.pages_scanned >= self.max_pages)
    }
}

/// Resets the engine's active flag on drop
struct ActiveGuard<'a>(&'a AtomicBool);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Produces [`DiscoverySnapshot`]s from the remote catalog
pub struct DiscoveryEngine {
    provider: Arc<dyn ICatalogProvider>,
    snapshots: Arc<dyn ISnapshotStore>,
    broadcaster: Arc<ProgressBroadcaster>,
    cache_ttl: Duration,
    active: AtomicBool,
}

impl DiscoveryEngine {
    pub fn new(
        provider: Arc<dyn ICatalogProvider>,
        snapshots: Arc<dyn ISnapshotStore>,
        broadcaster: Arc<ProgressBroadcaster>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            provider,
            snapshots,
            broadcaster,
            cache_ttl,
            active: AtomicBool::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Runs one discovery call.
    ///
    /// # Errors
    /// - [`SyncError::State`] if another discovery is running
    /// - [`SyncError::Cancelled`] if cancelled before the first page
    /// - the classified provider error if a page request fails
    #[instrument(skip(self, auth, cancel), fields(user = %auth.user_id))]
    pub async fn discover(
        &self,
        auth: &AuthContext,
        options: &DiscoveryOptions,
        cancel: &CancellationToken,
    ) -> Result<DiscoverySnapshot, SyncError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SyncError::State("a discovery is already running".into()));
        }
        let _guard = ActiveGuard(&self.active);

        let prior = self.load_prior(&auth.user_id).await;

        if options.use_cache && !options.continue_previous {
            let cached = prior
                .as_ref()
                .filter(|s| s.is_fresh(Utc::now(), self.cache_ttl) && options.served_by(s));
            if let Some(snapshot) = cached {
                info!(items = snapshot.total_items, "Serving cached discovery snapshot");
                self.broadcaster
                    .publish_discovery(DiscoveryProgress::from_snapshot(snapshot, false));
                return Ok(snapshot.clone());
            }
        }

        let prior = match prior {
            Some(previous) if options.continue_previous => {
                if previous.date_range == options.date_range() {
                    Some(previous)
                } else {
                    debug!("Previous discovery used another date range, starting over");
                    None
                }
            }
            _ => None,
        };
        let start_token = match (&prior, &options.page_token) {
            (_, Some(token)) => Some(token.clone()),
            (Some(previous), None) => match &previous.continuation_token {
                Some(token) => Some(token.clone()),
                None => {
                    info!("Previous discovery already reached the end of the catalog");
                    self.broadcaster
                        .publish_discovery(DiscoveryProgress::from_snapshot(previous, false));
                    return Ok(previous.clone());
                }
            },
            (None, None) => None,
        };

        let fetched = self.fetch_pages(auth, options, start_token, cancel).await?;

        let fetched = match options.date_range() {
            Some((start, end)) => {
                let pages = fetched.pages_scanned;
                let token = fetched.continuation_token;
                let before = fetched.total_items;
                let kept: Vec<_> = fetched
                    .items
                    .into_iter()
                    .filter(|item| item.creation_time().is_some_and(|t| t >= start && t <= end))
                    .collect();
                debug!(before, after = kept.len(), "Applied date filter");
                let mut filtered = DiscoverySnapshot::from_items(kept, pages, token);
                filtered.date_range = Some((start, end));
                filtered
            }
            None => fetched,
        };

        let snapshot = match prior {
            Some(previous) => previous.continued_with(fetched),
            None => DiscoverySnapshot {
                started_mid_catalog: options.page_token.is_some(),
                ..fetched
            },
        };

        if let Err(e) = self.snapshots.save_snapshot(&auth.user_id, &snapshot).await {
            warn!(error = %e, "Failed to cache discovery snapshot");
        }

        self.broadcaster
            .publish_discovery(DiscoveryProgress::from_snapshot(&snapshot, false));
        info!(
            items = snapshot.total_items,
            photos = snapshot.photo_count,
            videos = snapshot.video_count,
            pages = snapshot.pages_scanned,
            has_more = snapshot.has_more,
            "Discovery finished"
        );
        Ok(snapshot)
    }

    async fn fetch_pages(
        &self,
        auth: &AuthContext,
        options: &DiscoveryOptions,
        mut token: Option<PageToken>,
        cancel: &CancellationToken,
    ) -> Result<DiscoverySnapshot, SyncError> {
        let mut running = DiscoverySnapshot::from_items(Vec::new(), 0, token.clone());

        for _ in 0..options.max_pages {
            if cancel.is_cancelled() {
                if running.pages_scanned == 0 {
                    return Err(SyncError::Cancelled);
                }
                info!(pages = running.pages_scanned, "Discovery cancelled");
                break;
            }

            let page = self
                .provider
                .list_page(auth, options.page_size, token.as_ref())
                .await
                .map_err(|e| {
                    warn!(error = %e, pages = running.pages_scanned, "Catalog page request failed");
                    SyncError::from(e)
                })?;

            token = page.next_page_token;
            running = running.continued_with(DiscoverySnapshot::from_items(
                page.items,
                1,
                token.clone(),
            ));

            debug!(
                page = running.pages_scanned,
                items = running.total_items,
                has_next = token.is_some(),
                "Catalog page received"
            );
            self.broadcaster
                .publish_discovery(DiscoveryProgress::from_snapshot(&running, true));

            if token.is_none() {
                break;
            }
        }

        Ok(running)
    }

    async fn load_prior(&self, user: &UserId) -> Option<DiscoverySnapshot> {
        match self.snapshots.load_snapshot(user).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Cached discovery snapshot unreadable, ignoring it");
                None
            }
        }
    }

    /// The cached snapshot for `user`, fresh or not
    pub async fn cached_snapshot(&self, user: &UserId) -> Option<DiscoverySnapshot> {
        self.load_prior(user).await
    }

    pub async fn clear_cache(&self, user: &UserId) -> Result<(), SyncError> {
        self.snapshots
            .clear_snapshot(user)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))
    }
}
