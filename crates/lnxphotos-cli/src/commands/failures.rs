//! Failures command - items whose last download attempt failed

use anyhow::Result;
use clap::Args;
use lnxphotos_cache::SqliteLedgerStore;
use lnxphotos_core::domain::LedgerEntry;
use lnxphotos_core::ports::ILedgerStore;

use super::{open_database, Context};
use crate::output::plural;

#[derive(Debug, Args)]
pub struct FailuresCommand {
    /// Maximum entries to show, most recent first
    #[arg(long, default_value_t = 50)]
    pub limit: usize,
}

/// Failed entries, most recent attempt first, truncated to `limit`
pub fn recent_failures(entries: Vec<LedgerEntry>, limit: usize) -> Vec<LedgerEntry> {
    let mut failed: Vec<_> = entries.into_iter().filter(LedgerEntry::is_failed).collect();
    failed.sort_by(|a, b| b.last_attempt.cmp(&a.last_attempt));
    failed.truncate(limit);
    failed
}

impl FailuresCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config()?;
        let pool = open_database(&config).await?;

        let entries = SqliteLedgerStore::new(pool.pool().clone())
            .load_entries()
            .await?;
        let total_failed = entries.iter().filter(|e| e.is_failed()).count();
        let failures = recent_failures(entries, self.limit);

        if ctx.format.is_json() {
            let json = serde_json::json!({
                "total": total_failed,
                "failures": failures,
            });
            formatter.print_json(&json);
            return Ok(());
        }

        if failures.is_empty() {
            formatter.success("No failed downloads");
            return Ok(());
        }

        formatter.warn(&format!("{} failed", plural(total_failed, "item")));
        for entry in &failures {
            formatter.info("");
            formatter.info(entry.item_id.as_str());
            formatter.field(
                "Last attempt",
                &entry.last_attempt.format("%Y-%m-%d %H:%M:%S UTC"),
            );
            formatter.field("Attempts", &entry.attempts);
            formatter.field(
                "Error",
                &entry.last_error.as_deref().unwrap_or("unknown"),
            );
        }
        if failures.len() < total_failed {
            formatter.info("");
            formatter.info(&format!(
                "Showing {} of {}. Use --limit to see more.",
                failures.len(),
                total_failed
            ));
        }

        Ok(())
    }
}
