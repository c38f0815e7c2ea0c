//! Discovery snapshots
//!
//! A [`DiscoverySnapshot`] is the immutable result of one discovery call.
//! Fresh discovery replaces the previous snapshot; continuation produces a
//! new snapshot that concatenates the prior one with the newly scanned pages.
//!
//! A snapshot also records its scope: the date window it was filtered to and
//! whether the listing began at a caller-supplied page token. Only a snapshot
//! with no scope restriction and no remaining pages is the whole catalog.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::media_item::{MediaItem, MediaType};
use super::newtypes::PageToken;

/// Point-in-time catalog listing with summary statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverySnapshot {
    pub items: Vec<MediaItem>,
    pub total_items: usize,
    pub photo_count: usize,
    pub video_count: usize,
    pub estimated_size_bytes: u64,
    pub pages_scanned: u32,
    pub has_more: bool,
    pub continuation_token: Option<PageToken>,
    pub timestamp: DateTime<Utc>,
    /// Inclusive creation-time window the items were filtered to
    #[serde(default)]
    pub date_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Listing began at an explicit page token, not the first page
    #[serde(default)]
    pub started_mid_catalog: bool,
}

impl DiscoverySnapshot {
    /// Build a snapshot, deriving counts and the size estimate from `items`.
    ///
    /// `has_more` follows the presence of a continuation token.
    pub fn from_items(
        items: Vec<MediaItem>,
        pages_scanned: u32,
        continuation_token: Option<PageToken>,
    ) -> Self {
        let mut snapshot = Self {
            items: Vec::new(),
            total_items: 0,
            photo_count: 0,
            video_count: 0,
            estimated_size_bytes: 0,
            pages_scanned,
            has_more: continuation_token.is_some(),
            continuation_token,
            timestamp: Utc::now(),
            date_range: None,
            started_mid_catalog: false,
        };
        for item in items {
            snapshot.push(item);
        }
        snapshot
    }

    /// An empty snapshot with nothing scanned
    pub fn empty() -> Self {
        Self::from_items(Vec::new(), 0, None)
    }

    fn push(&mut self, item: MediaItem) {
        match item.media_type() {
            MediaType::Photo => self.photo_count += 1,
            MediaType::Video => self.video_count += 1,
        }
        self.estimated_size_bytes = self
            .estimated_size_bytes
            .saturating_add(item.estimated_size_bytes());
        self.total_items += 1;
        self.items.push(item);
    }

    /// Append a continuation result onto `self`.
    ///
    /// Items are concatenated and all counters summed. The newer call's
    /// token and timestamp win; the scope stays that of `self`.
    #[must_use]
    pub fn continued_with(self, next: DiscoverySnapshot) -> DiscoverySnapshot {
        let mut merged = self;
        merged.items.extend(next.items);
        merged.total_items += next.total_items;
        merged.photo_count += next.photo_count;
        merged.video_count += next.video_count;
        merged.estimated_size_bytes = merged
            .estimated_size_bytes
            .saturating_add(next.estimated_size_bytes);
        merged.pages_scanned += next.pages_scanned;
        merged.has_more = next.has_more;
        merged.continuation_token = next.continuation_token;
        merged.timestamp = next.timestamp;
        merged
    }

    /// Whether the items are the entire catalog.
    ///
    /// False while pages remain, and for any filtered or mid-catalog listing.
    pub fn is_complete(&self) -> bool {
        !self.has_more && self.date_range.is_none() && !self.started_mid_catalog
    }

    /// Whether the snapshot is younger than `ttl` at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = now.signed_duration_since(self.timestamp);
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => age >= chrono::Duration::zero() && age < ttl,
            Err(_) => true,
        }
    }
}
