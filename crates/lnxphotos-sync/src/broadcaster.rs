//! Progress/status broadcaster
//!
//! Fans discovery and sync progress out to any number of observers over a
//! tokio broadcast channel. Publishing never waits on subscribers: a
//! subscriber that falls behind the channel capacity skips what it missed.
//!
//! A new subscriber first receives the latest progress of both kinds, then
//! every later event.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{trace, warn};

use lnxphotos_core::domain::{DiscoverySnapshot, RunId, RunStatus, SyncRunState};

/// Events buffered per subscriber before it starts skipping
const DEFAULT_CAPACITY: usize = 256;

/// Progress of the current (or last) discovery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryProgress {
    /// Whether a discovery is running right now
    pub active: bool,
    pub pages_scanned: u32,
    pub items_found: usize,
    pub photo_count: usize,
    pub video_count: usize,
    pub estimated_size_bytes: u64,
    pub has_more: bool,
}

impl DiscoveryProgress {
    pub fn from_snapshot(snapshot: &DiscoverySnapshot, active: bool) -> Self {
        Self {
            active,
            pages_scanned: snapshot.pages_scanned,
            items_found: snapshot.total_items,
            photo_count: snapshot.photo_count,
            video_count: snapshot.video_count,
            estimated_size_bytes: snapshot.estimated_size_bytes,
            has_more: snapshot.has_more,
        }
    }
}

/// Progress of the current (or last) download run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncProgress {
    pub run_id: Option<RunId>,
    pub status: RunStatus,
    pub processed_items: usize,
    pub total_items: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub active_downloads: usize,
}

impl From<&SyncRunState> for SyncProgress {
    fn from(state: &SyncRunState) -> Self {
        Self {
            run_id: state.run_id,
            status: state.status.clone(),
            processed_items: state.processed_items,
            total_items: state.total_items,
            downloaded: state.downloaded,
            skipped: state.skipped,
            failed: state.failed,
            active_downloads: state.active_item_ids.len(),
        }
    }
}

/// One published update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusEvent {
    Discovery(DiscoveryProgress),
    Sync(SyncProgress),
}

#[derive(Debug, Default)]
struct Latest {
    discovery: DiscoveryProgress,
    sync: SyncProgress,
}

/// Fan-out of [`StatusEvent`]s to every current subscriber
#[derive(Debug)]
pub struct ProgressBroadcaster {
    sender: broadcast::Sender<StatusEvent>,
    latest: Mutex<Latest>,
}

impl ProgressBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            latest: Mutex::new(Latest::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Latest> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `event` as the latest of its kind and sends it to subscribers.
    ///
    /// With no subscribers this only updates the latest value.
    pub fn publish(&self, event: StatusEvent) {
        // Held across the send so a concurrent subscribe sees either the old
        // snapshot plus this event, or the new snapshot alone
        let mut latest = self.lock();
        match &event {
            StatusEvent::Discovery(p) => latest.discovery = p.clone(),
            StatusEvent::Sync(p) => latest.sync = p.clone(),
        }
        let delivered = self.sender.send(event).unwrap_or(0);
        trace!(subscribers = delivered, "Status event published");
    }

    pub fn publish_discovery(&self, progress: DiscoveryProgress) {
        self.publish(StatusEvent::Discovery(progress));
    }

    pub fn publish_sync(&self, state: &SyncRunState) {
        self.publish(StatusEvent::Sync(SyncProgress::from(state)));
    }

    /// Attaches a subscriber primed with the latest progress of both kinds
    pub fn subscribe(&self) -> Subscription {
        let latest = self.lock();
        let receiver = self.sender.subscribe();
        let pending = VecDeque::from([
            StatusEvent::Discovery(latest.discovery.clone()),
            StatusEvent::Sync(latest.sync.clone()),
        ]);
        Subscription { pending, receiver }
    }

    pub fn latest_discovery(&self) -> DiscoveryProgress {
        self.lock().discovery.clone()
    }

    pub fn latest_sync(&self) -> SyncProgress {
        self.lock().sync.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end handed out by [`ProgressBroadcaster::subscribe`]
#[derive(Debug)]
pub struct Subscription {
    pending: VecDeque<StatusEvent>,
    receiver: broadcast::Receiver<StatusEvent>,
}

impl Subscription {
    /// Waits for the next event; `None` once the broadcaster is gone
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Status subscriber lagging, skipped events");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is ready
    pub fn try_recv(&mut self) -> Option<StatusEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "Status subscriber lagging, skipped events");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}
