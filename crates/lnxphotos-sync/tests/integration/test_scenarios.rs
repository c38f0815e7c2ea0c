//! End-to-end scenarios through the service facade

use std::sync::Arc;
use std::time::Duration;

use lnxphotos_cache::{DatabasePool, SqliteLedgerStore, SqliteRunStateStore, SqliteSnapshotStore};
use lnxphotos_core::domain::{MediaItem, RunStatus, SyncRunState};
use lnxphotos_core::ports::{IRunStateStore, ProviderError};
use lnxphotos_sync::broadcaster::{ProgressBroadcaster, StatusEvent};
use lnxphotos_sync::discovery::{DiscoveryEngine, DiscoveryOptions};
use lnxphotos_sync::filesystem::LocalFileSystemAdapter;
use lnxphotos_sync::ledger::SyncLedger;
use lnxphotos_sync::orchestrator::{DownloadOrchestrator, OrchestratorConfig};
use lnxphotos_sync::service::PhotoSyncService;
use lnxphotos_sync::SyncError;

use crate::common::*;

fn mixed_library() -> Vec<MediaItem> {
    vec![
        photo("AF1Qlib00001", at(2024, 1, 1, 8, 0, 0)),
        video("AF1Qlib00002", at(2024, 1, 2, 8, 0, 0)),
        photo("AF1Qlib00003", at(2024, 1, 3, 8, 0, 0)),
        video("AF1Qlib00004", at(2024, 1, 4, 8, 0, 0)),
        photo("AF1Qlib00005", at(2024, 1, 5, 8, 0, 0)),
    ]
}

fn fresh_discovery() -> DiscoveryOptions {
    DiscoveryOptions {
        page_size: 3,
        max_pages: 10,
        use_cache: false,
        ..DiscoveryOptions::default()
    }
}

#[tokio::test]
async fn test_photos_only_sync_over_two_pages() {
    let h = Harness::new(mixed_library()).await;
    let service = h.service(OrchestratorConfig {
        include_videos: false,
        ..fast_config()
    });

    let state = service
        .discover_and_sync(&auth(), &fresh_discovery(), &h.sync_dir(), 2)
        .await
        .unwrap();

    assert_eq!(h.catalog.list_calls(), 2);
    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.processed_items, 5);
    assert_eq!(state.total_items, 5);
    assert_eq!(state.downloaded, 3);
    assert_eq!(state.skipped, 2);

    let stats = service.ledger().stats();
    assert_eq!(stats.synced, 3);
    assert_eq!(h.files().len(), 3);
    assert!(h.files().iter().all(|f| f.ends_with(".jpg")));

    // Flushed on the way out
    assert_eq!(h.ledger_store.saved().len(), 3);
}

#[tokio::test]
async fn test_second_run_downloads_nothing() {
    let h = Harness::new(mixed_library()).await;
    let service = h.service(fast_config());

    let first = service
        .discover_and_sync(&auth(), &fresh_discovery(), &h.sync_dir(), 3)
        .await
        .unwrap();
    let second = service
        .discover_and_sync(&auth(), &fresh_discovery(), &h.sync_dir(), 3)
        .await
        .unwrap();

    assert_eq!(first.downloaded, 5);
    assert_eq!(second.downloaded, 0);
    assert_eq!(second.skipped, 5);
    assert_eq!(h.catalog.download_count(), 5);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn test_date_filtered_sync_keeps_files_outside_range() {
    let h = Harness::new(vec![
        photo("AF1Qlib00001", at(2024, 1, 15, 8, 0, 0)),
        photo("AF1Qlib00002", at(2024, 6, 1, 8, 0, 0)),
    ])
    .await;
    let service = h.service(OrchestratorConfig {
        remove_missing: true,
        ..fast_config()
    });

    let full = service
        .discover_and_sync(&auth(), &fresh_discovery(), &h.sync_dir(), 2)
        .await
        .unwrap();
    assert_eq!(full.downloaded, 2);

    let summer = DiscoveryOptions {
        start: Some(at(2024, 5, 1, 0, 0, 0)),
        end: Some(at(2024, 7, 1, 0, 0, 0)),
        ..fresh_discovery()
    };
    let filtered = service
        .discover_and_sync(&auth(), &summer, &h.sync_dir(), 2)
        .await
        .unwrap();

    assert_eq!(filtered.status, RunStatus::Completed);
    assert_eq!(filtered.total_items, 1);
    assert_eq!(filtered.skipped, 1);
    assert_eq!(h.files().len(), 2);
    assert_eq!(service.ledger().stats().synced, 2);
}

#[tokio::test]
async fn test_discovery_failure_ends_run_in_error() {
    let h = Harness::new(mixed_library()).await;
    h.catalog
        .fail_list_call(0, ProviderError::Unauthorized("token expired".into()));
    let service = h.service(fast_config());
    let mut sub = h.broadcaster.subscribe();

    let state = service
        .discover_and_sync(&auth(), &fresh_discovery(), &h.sync_dir(), 2)
        .await
        .unwrap();

    match &state.status {
        RunStatus::Error(msg) => assert!(msg.contains("discovery failed")),
        other => panic!("expected error status, got {other:?}"),
    }
    assert_eq!(h.catalog.download_count(), 0);
    assert_eq!(h.run_states.last().unwrap(), state);

    let published = std::iter::from_fn(|| sub.try_recv())
        .filter_map(|event| match event {
            StatusEvent::Sync(p) => Some(p.status),
            StatusEvent::Discovery(_) => None,
        })
        .last();
    assert_eq!(published, Some(state.status.clone()));
    assert!(!service.controller().is_active());
}

#[tokio::test]
async fn test_cancel_during_discovery_ends_cancelled() {
    let h = Harness::new(photos(30)).await;
    h.catalog.set_list_delay(Duration::from_millis(50));
    let service = Arc::new(h.service(fast_config()));

    let run = tokio::spawn({
        let service = Arc::clone(&service);
        let dir = h.sync_dir();
        async move {
            let options = DiscoveryOptions {
                page_size: 1,
                max_pages: 30,
                use_cache: false,
                ..DiscoveryOptions::default()
            };
            service.discover_and_sync(&auth(), &options, &dir, 2).await
        }
    });

    while !service.discovery().is_active() {
        tokio::task::yield_now().await;
    }
    service.controller().cancel().unwrap();
    let state = run.await.unwrap().unwrap();

    // Pages fetched before the cancel are still synced; nothing after
    assert_eq!(state.status, RunStatus::Cancelled);
    assert!(h.catalog.list_calls() < 30);
    assert_eq!(h.catalog.download_count(), 0);
}

#[tokio::test]
async fn test_second_concurrent_run_is_rejected() {
    let h = Harness::new(photos(4)).await;
    h.catalog.close_gate();
    let service = Arc::new(h.service(fast_config()));
    let items = photos(4);

    let run = tokio::spawn({
        let service = Arc::clone(&service);
        let dir = h.sync_dir();
        let items = items.clone();
        async move { service.sync_items(&auth(), &items, &dir, 2).await }
    });
    h.catalog.wait_for_active(2).await;

    let err = service
        .sync_items(&auth(), &items, &h.sync_dir(), 2)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::State(_)));

    h.catalog.open_gate();
    let state = run.await.unwrap().unwrap();
    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.downloaded, 4);
}

#[tokio::test]
async fn test_interrupted_run_is_recovered_as_error() {
    let h = Harness::new(Vec::new()).await;
    let mut crashed = SyncRunState::begin(10);
    crashed.processed_items = 4;
    crashed.active_item_ids.insert(id("AF1Qinflight1"));
    h.run_states.save_run_state(&crashed).await.unwrap();
    let service = h.service(fast_config());

    let recovered = service.recover_interrupted_run().await.unwrap().unwrap();

    assert_eq!(recovered.status, RunStatus::Error("interrupted".into()));
    assert!(recovered.active_item_ids.is_empty());
    assert_eq!(recovered.processed_items, 4);
    assert_eq!(service.last_run_state().await.unwrap(), Some(recovered));

    // Nothing left to recover
    assert!(service.recover_interrupted_run().await.unwrap().is_none());
}

#[tokio::test]
async fn test_sqlite_backed_state_survives_restart() {
    let h = Harness::new(mixed_library()).await;
    let db_path = h.dir.path().join("state/lnxphotos.db");

    let open_service = |pool: &DatabasePool, broadcaster: Arc<ProgressBroadcaster>| {
        let pool = pool.pool().clone();
        let catalog = h.catalog.clone();
        async move {
            let fs = Arc::new(LocalFileSystemAdapter::new());
            let ledger = Arc::new(
                SyncLedger::open(Arc::new(SqliteLedgerStore::new(pool.clone())), fs.clone()).await,
            );
            let run_states = Arc::new(SqliteRunStateStore::new(pool.clone()));
            let discovery = DiscoveryEngine::new(
                catalog.clone(),
                Arc::new(SqliteSnapshotStore::new(pool)),
                broadcaster.clone(),
                Duration::from_secs(3600),
            );
            let orchestrator = DownloadOrchestrator::new(
                catalog,
                fs,
                ledger,
                run_states.clone(),
                broadcaster.clone(),
                fast_config(),
            );
            PhotoSyncService::new(discovery, orchestrator, run_states, broadcaster)
        }
    };

    {
        let pool = DatabasePool::new(&db_path).await.unwrap();
        let service = open_service(&pool, Arc::new(ProgressBroadcaster::new())).await;
        let state = service
            .discover_and_sync(&auth(), &fresh_discovery(), &h.sync_dir(), 2)
            .await
            .unwrap();
        assert_eq!(state.downloaded, 5);
        pool.pool().close().await;
    }

    let pool = DatabasePool::new(&db_path).await.unwrap();
    let service = open_service(&pool, Arc::new(ProgressBroadcaster::new())).await;
    assert_eq!(service.ledger().len(), 5);
    assert_eq!(
        service.last_run_state().await.unwrap().unwrap().status,
        RunStatus::Completed
    );

    // Cached snapshot and ledger both short-circuit the second run
    let cached = DiscoveryOptions {
        use_cache: true,
        ..fresh_discovery()
    };
    let state = service
        .discover_and_sync(&auth(), &cached, &h.sync_dir(), 2)
        .await
        .unwrap();
    assert_eq!(state.downloaded, 0);
    assert_eq!(state.skipped, 5);
    assert_eq!(h.catalog.list_calls(), 2);
    assert_eq!(h.catalog.download_count(), 5);
}
