//! Sync command - discover the catalog and download what is new

use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use clap::Args;
use lnxphotos_core::config::SyncConfig;
use lnxphotos_core::domain::{RunStatus, SyncRunState};
use lnxphotos_sync::broadcaster::{StatusEvent, Subscription};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::discover::DiscoveryArgs;
use super::{cancel_run_on_ctrl_c, resolve_auth, App, Context};
use crate::output::{plural, OutputFormatter};

/// Progress lines are printed at most once per this many processed items
const PROGRESS_EVERY: usize = 25;

#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(flatten)]
    pub scope: DiscoveryArgs,

    /// Download photos only
    #[arg(long, conflicts_with = "videos_only")]
    pub photos_only: bool,

    /// Download videos only
    #[arg(long)]
    pub videos_only: bool,

    /// Delete local files whose item is no longer in the library
    #[arg(long)]
    pub remove_missing: bool,

    /// Maximum simultaneous downloads
    #[arg(short = 'j', long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Download into this directory instead of the configured one
    #[arg(long, value_name = "PATH")]
    pub dir: Option<PathBuf>,
}

impl SyncCommand {
    /// Overlays the flags onto the configured download settings
    fn apply(&self, sync: &mut SyncConfig) {
        if self.photos_only {
            sync.include_photos = true;
            sync.include_videos = false;
        }
        if self.videos_only {
            sync.include_photos = false;
            sync.include_videos = true;
        }
        if self.remove_missing {
            sync.remove_missing = true;
        }
        if let Some(concurrency) = self.concurrency {
            sync.concurrency = concurrency;
        }
        if let Some(dir) = &self.dir {
            sync.directory = dir.clone();
        }
    }

    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.formatter();
        let mut config = ctx.load_config()?;
        self.apply(&mut config.sync);

        let errors = config.validate();
        if let Some(first) = errors.first() {
            for error in &errors {
                formatter.error(&error.to_string());
            }
            bail!("invalid settings: {first}");
        }

        let auth = resolve_auth(&config)?;
        let options = self.scope.options(&config)?;
        let sync_dir = config.sync.directory.clone();
        let concurrency = config.sync.concurrency;
        let flush_interval = config.sync.ledger_flush_interval();

        let app = App::open(config).await?;
        let service = &app.service;

        let shutdown = CancellationToken::new();
        let flusher = service
            .ledger()
            .spawn_periodic_flush(flush_interval, shutdown.clone());
        let ctrl_c = cancel_run_on_ctrl_c(service.controller().clone());
        let printer = (!ctx.quiet && !ctx.format.is_json())
            .then(|| spawn_progress_printer(service.broadcaster().subscribe()));

        info!(
            dir = %sync_dir.display(),
            concurrency,
            "Starting sync"
        );
        let result = service
            .discover_and_sync(&auth, &options, &sync_dir, concurrency)
            .await;

        ctrl_c.cancel();
        shutdown.cancel();
        if let Err(e) = flusher.await {
            warn!(error = %e, "Ledger flusher task failed");
        }
        if let Some(printer) = printer {
            printer.abort();
        }

        let state = result?;
        report(ctx, formatter.as_ref(), &state, &sync_dir)
    }
}

fn report(
    ctx: &Context,
    formatter: &dyn OutputFormatter,
    state: &SyncRunState,
    sync_dir: &std::path::Path,
) -> Result<()> {
    if ctx.format.is_json() {
        let json = serde_json::json!({
            "success": state.status == RunStatus::Completed,
            "status": state.status.to_string(),
            "run_id": state.run_id.map(|id| id.to_string()),
            "directory": sync_dir.display().to_string(),
            "total_items": state.total_items,
            "processed_items": state.processed_items,
            "downloaded": state.downloaded,
            "skipped": state.skipped,
            "failed": state.failed,
        });
        formatter.print_json(&json);
    } else {
        match &state.status {
            RunStatus::Completed => formatter.success(&format!(
                "Sync completed: {} downloaded",
                plural(state.downloaded, "item")
            )),
            RunStatus::Cancelled => formatter.warn(&format!(
                "Sync cancelled after {} of {}",
                state.processed_items,
                plural(state.total_items, "item")
            )),
            RunStatus::Error(msg) => formatter.error(&format!("Sync failed: {msg}")),
            other => formatter.warn(&format!("Sync ended in state {other}")),
        }
        formatter.field("Directory", &sync_dir.display());
        formatter.field("Downloaded", &state.downloaded);
        formatter.field("Skipped", &state.skipped);
        formatter.field("Failed", &state.failed);
        if state.failed > 0 {
            formatter.info("");
            formatter.info("Run 'lnxphotos failures' to see why items failed.");
        }
    }

    match &state.status {
        RunStatus::Error(msg) => Err(anyhow!("sync run failed: {msg}")),
        _ => Ok(()),
    }
}

/// Prints discovery pages and download progress until aborted
fn spawn_progress_printer(mut subscription: Subscription) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_processed = 0;
        let mut last_status = RunStatus::Idle;

        while let Some(event) = subscription.recv().await {
            match event {
                StatusEvent::Discovery(progress) if progress.active && progress.pages_scanned > 0 => {
                    println!(
                        "  Scanned {}, {} found",
                        plural(progress.pages_scanned as usize, "page"),
                        plural(progress.items_found, "item")
                    );
                }
                StatusEvent::Discovery(_) => {}
                StatusEvent::Sync(progress) => {
                    let status_changed = progress.status != last_status;
                    let stepped = progress.processed_items >= last_processed + PROGRESS_EVERY
                        || (progress.processed_items == progress.total_items
                            && progress.processed_items != last_processed);
                    if status_changed && progress.status == RunStatus::Paused {
                        println!("  Paused");
                    }
                    if stepped || (status_changed && progress.status == RunStatus::Running) {
                        println!(
                            "  {}/{} processed ({} downloaded, {} skipped, {} failed, {} active)",
                            progress.processed_items,
                            progress.total_items,
                            progress.downloaded,
                            progress.skipped,
                            progress.failed,
                            progress.active_downloads
                        );
                        last_processed = progress.processed_items;
                    }
                    last_status = progress.status;
                }
            }
        }
    })
}
