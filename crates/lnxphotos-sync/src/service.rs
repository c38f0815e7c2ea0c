//! Service facade
//!
//! [`PhotoSyncService`] ties discovery and the download orchestrator to a
//! single [`SyncController`], so one handle can start, pause and cancel the
//! whole discover-then-download flow.

use std::path::Path;
use std::sync::Arc;

use lnxphotos_core::domain::{DiscoverySnapshot, MediaItem, RunStatus, SyncRunState};
use lnxphotos_core::ports::{AuthContext, IRunStateStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::broadcaster::ProgressBroadcaster;
use crate::control::SyncController;
use crate::discovery::{DiscoveryEngine, DiscoveryOptions};
use crate::ledger::SyncLedger;
use crate::orchestrator::DownloadOrchestrator;
use crate::SyncError;

pub struct PhotoSyncService {
    discovery: DiscoveryEngine,
    orchestrator: DownloadOrchestrator,
    run_states: Arc<dyn IRunStateStore>,
    broadcaster: Arc<ProgressBroadcaster>,
    controller: SyncController,
}

impl PhotoSyncService {
    pub fn new(
        discovery: DiscoveryEngine,
        orchestrator: DownloadOrchestrator,
        run_states: Arc<dyn IRunStateStore>,
        broadcaster: Arc<ProgressBroadcaster>,
    ) -> Self {
        Self {
            discovery,
            orchestrator,
            run_states,
            broadcaster,
            controller: SyncController::new(),
        }
    }

    /// Handle for pausing, resuming and cancelling the active run
    pub fn controller(&self) -> &SyncController {
        &self.controller
    }

    pub fn broadcaster(&self) -> &Arc<ProgressBroadcaster> {
        &self.broadcaster
    }

    pub fn discovery(&self) -> &DiscoveryEngine {
        &self.discovery
    }

    pub fn ledger(&self) -> &Arc<SyncLedger> {
        self.orchestrator.ledger()
    }

    /// Rewrites a run left `Running` or `Paused` by a dead process as
    /// `Error("interrupted")`.
    ///
    /// Returns the rewritten state, or `None` if there was nothing to
    /// recover.
    pub async fn recover_interrupted_run(&self) -> Result<Option<SyncRunState>, SyncError> {
        let Some(mut state) = self.last_run_state().await? else {
            return Ok(None);
        };
        if !state.mark_interrupted() {
            return Ok(None);
        }

        warn!(run_id = ?state.run_id, "Previous sync run was interrupted");
        self.run_states
            .save_run_state(&state)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        self.broadcaster.publish_sync(&state);
        Ok(Some(state))
    }

    pub async fn last_run_state(&self) -> Result<Option<SyncRunState>, SyncError> {
        self.run_states
            .load_run_state()
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))
    }

    /// Runs discovery on its own, outside any download run
    pub async fn discover(
        &self,
        auth: &AuthContext,
        options: &DiscoveryOptions,
        cancel: &CancellationToken,
    ) -> Result<DiscoverySnapshot, SyncError> {
        self.discovery.discover(auth, options, cancel).await
    }

    /// Downloads an already discovered item set.
    ///
    /// # Errors
    /// [`SyncError::State`] if a run is already active.
    pub async fn sync_items(
        &self,
        auth: &AuthContext,
        items: &[MediaItem],
        sync_dir: &Path,
        concurrency: usize,
    ) -> Result<SyncRunState, SyncError> {
        let control = self.controller.begin_run()?;
        let state = self
            .orchestrator
            .run(auth, items, sync_dir, concurrency, control)
            .await;
        self.flush_ledger().await;
        Ok(state)
    }

    /// Discovers the catalog, then downloads what it found.
    ///
    /// The run is registered before discovery starts, so a cancel issued
    /// through [`controller`](Self::controller) stops either phase. A
    /// discovery failure ends the run as `Error` (or `Cancelled`) without
    /// downloading anything.
    ///
    /// # Errors
    /// [`SyncError::State`] if a run is already active.
    #[instrument(skip_all, fields(user = %auth.user_id))]
    pub async fn discover_and_sync(
        &self,
        auth: &AuthContext,
        options: &DiscoveryOptions,
        sync_dir: &Path,
        concurrency: usize,
    ) -> Result<SyncRunState, SyncError> {
        let control = self.controller.begin_run()?;

        let snapshot = match self
            .discovery
            .discover(auth, options, control.cancel_token())
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Discovery failed, sync run not started");
                let status = match e {
                    SyncError::Cancelled => RunStatus::Cancelled,
                    other => RunStatus::Error(format!("discovery failed: {other}")),
                };
                return Ok(self.abandon(status).await);
            }
        };

        info!(
            items = snapshot.total_items,
            complete = snapshot.is_complete(),
            "Discovery done, starting downloads"
        );
        let state = if snapshot.is_complete() {
            self.orchestrator
                .run(auth, &snapshot.items, sync_dir, concurrency, control)
                .await
        } else {
            self.orchestrator
                .run_partial(auth, &snapshot.items, sync_dir, concurrency, control)
                .await
        };
        self.flush_ledger().await;
        Ok(state)
    }

    /// Records a run that ended before any download was scheduled
    async fn abandon(&self, status: RunStatus) -> SyncRunState {
        let mut state = SyncRunState::begin(0);
        if let Err(e) = state.transition(status) {
            warn!(error = %e, "Unexpected abandoned run status");
        }
        if let Err(e) = self.run_states.save_run_state(&state).await {
            warn!(error = %e, "Failed to persist run state");
        }
        self.broadcaster.publish_sync(&state);
        state
    }

    async fn flush_ledger(&self) {
        if let Err(e) = self.ledger().flush().await {
            warn!(error = %e, "Failed to flush sync ledger");
        }
    }
}
