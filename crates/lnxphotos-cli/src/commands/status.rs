//! Status command - last run, ledger totals and cached catalog

use anyhow::Result;
use clap::Args;
use lnxphotos_cache::{SqliteLedgerStore, SqliteRunStateStore, SqliteSnapshotStore};
use lnxphotos_core::domain::LedgerStats;
use lnxphotos_core::ports::{ILedgerStore, IRunStateStore, ISnapshotStore};
use tracing::debug;

use super::{open_database, resolve_user, Context};
use crate::output::{human_bytes, plural};

#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config()?;
        let pool = open_database(&config).await?;

        let run = SqliteRunStateStore::new(pool.pool().clone())
            .load_run_state()
            .await?;
        let entries = SqliteLedgerStore::new(pool.pool().clone())
            .load_entries()
            .await?;
        let stats = LedgerStats::from_entries(&entries);

        // The cached catalog is keyed by user; skip it when none is known
        let snapshot = match resolve_user(&config) {
            Ok(user) => {
                SqliteSnapshotStore::new(pool.pool().clone())
                    .load_snapshot(&user)
                    .await?
            }
            Err(e) => {
                debug!(error = %e, "No user, skipping cached catalog");
                None
            }
        };

        if ctx.format.is_json() {
            let json = serde_json::json!({
                "directory": config.sync.directory.display().to_string(),
                "last_run": run,
                "ledger": stats,
                "catalog": snapshot.as_ref().map(|s| serde_json::json!({
                    "total_items": s.total_items,
                    "has_more": s.has_more,
                    "complete": s.is_complete(),
                    "timestamp": s.timestamp.to_rfc3339(),
                })),
            });
            formatter.print_json(&json);
            return Ok(());
        }

        formatter.success("LNXPhotos status");
        formatter.field("Directory", &config.sync.directory.display());
        formatter.info("");

        match &run {
            Some(run) => {
                formatter.info("Last run:");
                formatter.field("Status", &run.status);
                if let Some(started) = run.started_at {
                    formatter.field("Started", &started.format("%Y-%m-%d %H:%M:%S UTC"));
                }
                if let Some(finished) = run.finished_at {
                    formatter.field("Finished", &finished.format("%Y-%m-%d %H:%M:%S UTC"));
                }
                formatter.field(
                    "Processed",
                    &format!("{} of {}", run.processed_items, run.total_items),
                );
                formatter.field("Downloaded", &run.downloaded);
                formatter.field("Skipped", &run.skipped);
                formatter.field("Failed", &run.failed);
            }
            None => formatter.info("No sync run recorded yet."),
        }

        formatter.info("");
        formatter.info("Ledger:");
        formatter.field("Tracked", &plural(stats.total, "item"));
        formatter.field("Synced", &stats.synced);
        formatter.field("Failed", &stats.failed);

        if let Some(snapshot) = snapshot {
            formatter.info("");
            formatter.info("Cached catalog:");
            formatter.field("Items", &snapshot.total_items);
            formatter.field("Estimated size", &human_bytes(snapshot.estimated_size_bytes));
            formatter.field(
                "Scanned at",
                &snapshot.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            );
            if snapshot.has_more {
                formatter.field("Complete", &"no, more pages remain");
            } else if !snapshot.is_complete() {
                formatter.field("Complete", &"no, filtered listing");
            }
        }

        Ok(())
    }
}
