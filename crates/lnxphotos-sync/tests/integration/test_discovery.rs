//! Catalog discovery engine tests against the in-memory catalog

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tokio_util::sync::CancellationToken;

use lnxphotos_core::domain::{MediaItem, MediaType, PageToken};
use lnxphotos_core::ports::ProviderError;
use lnxphotos_sync::broadcaster::StatusEvent;
use lnxphotos_sync::discovery::DiscoveryOptions;
use lnxphotos_sync::SyncError;

use crate::common::*;

const HOUR: Duration = Duration::from_secs(3600);

fn options(page_size: u32, max_pages: u32) -> DiscoveryOptions {
    DiscoveryOptions {
        page_size,
        max_pages,
        use_cache: false,
        ..DiscoveryOptions::default()
    }
}

#[tokio::test]
async fn test_all_pages_within_limit() {
    let h = Harness::new(photos(25)).await;
    let engine = h.discovery(HOUR);

    let snapshot = engine
        .discover(&auth(), &options(10, 5), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(snapshot.total_items, 25);
    assert_eq!(snapshot.items.len(), 25);
    assert_eq!(snapshot.pages_scanned, 3);
    assert_eq!(snapshot.photo_count, 25);
    assert!(!snapshot.has_more);
    assert!(snapshot.continuation_token.is_none());
    assert_eq!(h.catalog.list_calls(), 3);
}

#[tokio::test]
async fn test_page_limit_leaves_continuation_token() {
    let items = photos(25);
    let h = Harness::new(items.clone()).await;
    let engine = h.discovery(HOUR);

    let first = engine
        .discover(&auth(), &options(10, 2), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(first.total_items, 20);
    assert_eq!(first.pages_scanned, 2);
    assert!(first.has_more);
    assert_eq!(first.items[..], items[..20]);
    let token = first.continuation_token.clone().unwrap();
    assert_eq!(token.as_str(), "offset-20");

    let rest = engine
        .discover(
            &auth(),
            &DiscoveryOptions {
                continue_previous: true,
                ..options(10, 2)
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(rest.total_items, 25);
    assert_eq!(rest.items, items);
    assert_eq!(rest.pages_scanned, 3);
    assert!(!rest.has_more);
    assert_eq!(h.snapshots.get("user-1").unwrap(), rest);
}

#[tokio::test]
async fn test_continue_after_end_returns_previous_snapshot() {
    let h = Harness::new(photos(5)).await;
    let engine = h.discovery(HOUR);
    let cancel = CancellationToken::new();

    let done = engine.discover(&auth(), &options(10, 5), &cancel).await.unwrap();
    let again = engine
        .discover(
            &auth(),
            &DiscoveryOptions {
                continue_previous: true,
                ..options(10, 5)
            },
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(again, done);
    assert_eq!(h.catalog.list_calls(), 1);
}

#[tokio::test]
async fn test_explicit_page_token_starts_mid_catalog() {
    let items = photos(12);
    let h = Harness::new(items.clone()).await;
    let engine = h.discovery(HOUR);

    let snapshot = engine
        .discover(
            &auth(),
            &DiscoveryOptions {
                page_token: Some(PageToken::new("offset-10".to_string()).unwrap()),
                ..options(10, 5)
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(snapshot.items, items[10..]);
    assert!(!snapshot.has_more);
    assert!(!snapshot.is_complete());
}

#[tokio::test]
async fn test_date_filter_includes_bounds_exactly() {
    let start = at(2024, 6, 1, 0, 0, 0);
    let end = at(2024, 6, 30, 23, 59, 59);
    let micro = ChronoDuration::microseconds(1);
    let items = vec![
        photo("AF1QbeforeAA", start - micro),
        photo("AF1QatStartA", start),
        photo("AF1QmiddleAA", at(2024, 6, 15, 12, 0, 0)),
        photo("AF1QatEndAAA", end),
        photo("AF1QafterAAA", end + micro),
    ];
    let mut all = items.clone();
    all.push(MediaItem::new(
        id("AF1QundatedA"),
        "scan.jpg",
        MediaType::Photo,
        "https://media.example.com/undated=d",
    ));

    let h = Harness::new(all).await;
    let engine = h.discovery(HOUR);
    let snapshot = engine
        .discover(
            &auth(),
            &DiscoveryOptions {
                start: Some(start),
                end: Some(end),
                ..options(2, 10)
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let ids: Vec<_> = snapshot.items.iter().map(|i| i.id().as_str().to_string()).collect();
    assert_eq!(ids, vec!["AF1QatStartA", "AF1QmiddleAA", "AF1QatEndAAA"]);
    assert_eq!(snapshot.total_items, 3);
    assert_eq!(snapshot.pages_scanned, 3);
}

#[tokio::test]
async fn test_single_date_bound_is_ignored() {
    let h = Harness::new(photos(3)).await;
    let engine = h.discovery(HOUR);

    let snapshot = engine
        .discover(
            &auth(),
            &DiscoveryOptions {
                start: Some(at(2030, 1, 1, 0, 0, 0)),
                ..options(10, 5)
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(snapshot.total_items, 3);
}

#[tokio::test]
async fn test_fresh_cache_is_served_without_fetching() {
    let h = Harness::new(photos(5)).await;
    let engine = h.discovery(HOUR);
    let cached = DiscoveryOptions {
        use_cache: true,
        ..options(10, 5)
    };

    let first = engine.discover(&auth(), &cached, &CancellationToken::new()).await.unwrap();
    h.catalog.set_items(photos(8));
    let second = engine.discover(&auth(), &cached, &CancellationToken::new()).await.unwrap();

    assert_eq!(second, first);
    assert_eq!(h.catalog.list_calls(), 1);

    // Bypassing the cache sees the new catalog
    let third = engine
        .discover(&auth(), &options(10, 5), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(third.total_items, 8);
}

#[tokio::test]
async fn test_stale_cache_is_refetched() {
    let h = Harness::new(photos(5)).await;
    let engine = h.discovery(HOUR);
    let cached = DiscoveryOptions {
        use_cache: true,
        ..options(10, 5)
    };

    engine.discover(&auth(), &cached, &CancellationToken::new()).await.unwrap();
    h.snapshots.age("user-1", ChronoDuration::hours(2));
    engine.discover(&auth(), &cached, &CancellationToken::new()).await.unwrap();

    assert_eq!(h.catalog.list_calls(), 2);
}

fn january_and_june() -> Vec<MediaItem> {
    vec![
        photo("AF1Qjan00001", at(2024, 1, 10, 9, 0, 0)),
        photo("AF1Qjun00001", at(2024, 6, 10, 9, 0, 0)),
    ]
}

#[tokio::test]
async fn test_cache_not_served_to_other_date_range() {
    let h = Harness::new(january_and_june()).await;
    let engine = h.discovery(HOUR);
    let unfiltered = DiscoveryOptions {
        use_cache: true,
        ..options(10, 5)
    };
    let summer = DiscoveryOptions {
        start: Some(at(2024, 5, 1, 0, 0, 0)),
        end: Some(at(2024, 7, 1, 0, 0, 0)),
        ..unfiltered.clone()
    };

    let all = engine.discover(&auth(), &unfiltered, &CancellationToken::new()).await.unwrap();
    assert_eq!(all.total_items, 2);
    assert!(all.is_complete());

    let filtered = engine.discover(&auth(), &summer, &CancellationToken::new()).await.unwrap();
    assert_eq!(filtered.total_items, 1);
    assert_eq!(filtered.items[0].id().as_str(), "AF1Qjun00001");
    assert!(!filtered.is_complete());
    assert_eq!(h.catalog.list_calls(), 2);

    // The filtered listing now cached must not pass for the whole catalog
    let again = engine.discover(&auth(), &unfiltered, &CancellationToken::new()).await.unwrap();
    assert_eq!(again.total_items, 2);
    assert!(again.is_complete());
    assert_eq!(h.catalog.list_calls(), 3);

    // Same range again is a cache hit
    engine.discover(&auth(), &unfiltered, &CancellationToken::new()).await.unwrap();
    assert_eq!(h.catalog.list_calls(), 3);
}

#[tokio::test]
async fn test_cache_not_served_when_more_pages_allowed() {
    let h = Harness::new(photos(25)).await;
    let engine = h.discovery(HOUR);
    let one_page = DiscoveryOptions {
        use_cache: true,
        ..options(10, 1)
    };

    let partial = engine.discover(&auth(), &one_page, &CancellationToken::new()).await.unwrap();
    assert!(partial.has_more);

    // A repeat with the same page limit is answered from the cache
    engine.discover(&auth(), &one_page, &CancellationToken::new()).await.unwrap();
    assert_eq!(h.catalog.list_calls(), 1);

    let wider = DiscoveryOptions {
        max_pages: 5,
        ..one_page
    };
    let full = engine.discover(&auth(), &wider, &CancellationToken::new()).await.unwrap();
    assert_eq!(full.total_items, 25);
    assert!(!full.has_more);
    assert_eq!(h.catalog.list_calls(), 4);
}

#[tokio::test]
async fn test_cache_not_served_to_explicit_page_token() {
    let items = photos(12);
    let h = Harness::new(items.clone()).await;
    let engine = h.discovery(HOUR);
    let cached = DiscoveryOptions {
        use_cache: true,
        ..options(10, 5)
    };

    engine.discover(&auth(), &cached, &CancellationToken::new()).await.unwrap();
    let tail = engine
        .discover(
            &auth(),
            &DiscoveryOptions {
                page_token: Some(PageToken::new("offset-10".to_string()).unwrap()),
                ..cached
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(tail.items, items[10..]);
}

#[tokio::test]
async fn test_continue_with_other_date_range_starts_over() {
    let h = Harness::new(january_and_june()).await;
    let engine = h.discovery(HOUR);

    let first = engine.discover(&auth(), &options(1, 1), &CancellationToken::new()).await.unwrap();
    assert!(first.has_more);

    let summer = DiscoveryOptions {
        continue_previous: true,
        start: Some(at(2024, 5, 1, 0, 0, 0)),
        end: Some(at(2024, 7, 1, 0, 0, 0)),
        ..options(1, 5)
    };
    let continued = engine.discover(&auth(), &summer, &CancellationToken::new()).await.unwrap();

    // Started from the first page, not appended to the unfiltered page
    let ids: Vec<_> = continued.items.iter().map(|i| i.id().as_str().to_string()).collect();
    assert_eq!(ids, vec!["AF1Qjun00001"]);
    assert_eq!(continued.pages_scanned, 2);
    assert_eq!(
        continued.date_range,
        Some((at(2024, 5, 1, 0, 0, 0), at(2024, 7, 1, 0, 0, 0)))
    );
}

#[tokio::test]
async fn test_cache_is_per_user() {
    let h = Harness::new(photos(5)).await;
    let engine = h.discovery(HOUR);
    let cached = DiscoveryOptions {
        use_cache: true,
        ..options(10, 5)
    };

    engine.discover(&auth(), &cached, &CancellationToken::new()).await.unwrap();
    engine
        .discover(&auth_for("user-2"), &cached, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(h.catalog.list_calls(), 2);
    assert!(h.snapshots.get("user-2").is_some());

    engine.clear_cache(&auth().user_id).await.unwrap();
    assert!(engine.cached_snapshot(&auth().user_id).await.is_none());
    assert!(h.snapshots.get("user-2").is_some());
}

#[tokio::test]
async fn test_page_failure_is_classified_and_not_cached() {
    let h = Harness::new(photos(25)).await;
    h.catalog
        .fail_list_call(1, ProviderError::Unauthorized("token revoked".into()));
    let engine = h.discovery(HOUR);

    let err = engine
        .discover(&auth(), &options(10, 5), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_auth());
    assert!(h.snapshots.get("user-1").is_none());
    assert!(!engine.is_active());
}

#[tokio::test]
async fn test_transient_page_failure_surfaces_as_transient() {
    let h = Harness::new(photos(5)).await;
    h.catalog.fail_list_call(
        0,
        ProviderError::Server {
            status: 502,
            message: "bad gateway".into(),
        },
    );
    let engine = h.discovery(HOUR);

    let err = engine
        .discover(&auth(), &options(10, 5), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::TransientNetwork(_)));
}

#[tokio::test]
async fn test_cancel_before_first_page() {
    let h = Harness::new(photos(5)).await;
    let engine = h.discovery(HOUR);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine.discover(&auth(), &options(10, 5), &cancel).await.unwrap_err();

    assert_eq!(err, SyncError::Cancelled);
    assert_eq!(h.catalog.list_calls(), 0);
}

#[tokio::test]
async fn test_cancel_mid_discovery_keeps_pages_so_far() {
    let h = Harness::new(photos(50)).await;
    let engine = h.discovery(HOUR);
    let cancel = CancellationToken::new();
    h.catalog.cancel_after_pages(2, cancel.clone());

    let snapshot = engine.discover(&auth(), &options(10, 10), &cancel).await.unwrap();

    assert_eq!(snapshot.pages_scanned, 2);
    assert_eq!(snapshot.total_items, 20);
    assert!(snapshot.has_more);
    assert_eq!(h.catalog.list_calls(), 2);
}

#[tokio::test]
async fn test_second_concurrent_discovery_is_rejected() {
    let h = Harness::new(photos(5)).await;
    h.catalog.set_list_delay(Duration::from_millis(200));
    let engine = Arc::new(h.discovery(HOUR));

    let first = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move {
            engine
                .discover(&auth(), &options(10, 5), &CancellationToken::new())
                .await
        }
    });
    while !engine.is_active() {
        tokio::task::yield_now().await;
    }

    let err = engine
        .discover(&auth(), &options(10, 5), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::State(_)));

    assert_eq!(first.await.unwrap().unwrap().total_items, 5);
    assert!(!engine.is_active());
}

#[tokio::test]
async fn test_progress_published_per_page() {
    let h = Harness::new(photos(30)).await;
    let engine = h.discovery(HOUR);
    let mut sub = h.broadcaster.subscribe();

    engine
        .discover(&auth(), &options(10, 5), &CancellationToken::new())
        .await
        .unwrap();

    let discovery: Vec<_> = std::iter::from_fn(|| sub.try_recv())
        .filter_map(|event| match event {
            StatusEvent::Discovery(p) => Some(p),
            StatusEvent::Sync(_) => None,
        })
        .collect();

    // Initial snapshot, one per page, then the final summary
    assert_eq!(discovery.len(), 5);
    let pages: Vec<_> = discovery[1..4].iter().map(|p| p.pages_scanned).collect();
    assert_eq!(pages, vec![1, 2, 3]);
    assert!(discovery[1..4].iter().all(|p| p.active));
    let last = discovery.last().unwrap();
    assert!(!last.active);
    assert_eq!(last.items_found, 30);
    assert_eq!(h.broadcaster.latest_discovery(), *last);
}
