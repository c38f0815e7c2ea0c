//! Discover command - scan the remote catalog without downloading

use anyhow::{bail, Context as _, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use clap::Args;
use lnxphotos_core::config::Config;
use lnxphotos_core::domain::DiscoverySnapshot;
use lnxphotos_sync::discovery::DiscoveryOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{cancel_token_on_ctrl_c, resolve_auth, App, Context};
use crate::output::{human_bytes, plural, OutputFormatter};

/// Catalog scope flags shared by `discover` and `sync`
#[derive(Debug, Args)]
pub struct DiscoveryArgs {
    /// Resume from where the previous discovery stopped
    #[arg(long = "continue")]
    pub continue_previous: bool,

    /// Ignore a cached snapshot and fetch again
    #[arg(long)]
    pub no_cache: bool,

    /// Maximum catalog pages to fetch in this call
    #[arg(long, value_name = "N")]
    pub max_pages: Option<u32>,

    /// Items per catalog page (1-100)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..=100))]
    pub page_size: Option<u32>,

    /// Only items created on or after this date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", requires = "to")]
    pub from: Option<NaiveDate>,

    /// Only items created on or before this date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", requires = "from")]
    pub to: Option<NaiveDate>,
}

impl DiscoveryArgs {
    /// Overlays the flags onto the configured discovery settings
    pub fn options(&self, config: &Config) -> Result<DiscoveryOptions> {
        let mut options = DiscoveryOptions::from(&config.discovery);
        options.continue_previous = self.continue_previous;
        options.use_cache = !self.no_cache;
        if let Some(max_pages) = self.max_pages {
            options.max_pages = max_pages;
        }
        if let Some(page_size) = self.page_size {
            options.page_size = page_size;
        }
        if let (Some(from), Some(to)) = (self.from, self.to) {
            let (start, end) = day_range(from, to)?;
            options.start = Some(start);
            options.end = Some(end);
        }
        Ok(options)
    }
}

/// First and last instant of the inclusive date range `from..=to`, in UTC
pub fn day_range(from: NaiveDate, to: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    if from > to {
        bail!("--from {from} is after --to {to}");
    }
    let last_instant = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)
        .context("invalid end-of-day time")?;
    let start = Utc.from_utc_datetime(&from.and_time(NaiveTime::MIN));
    let end = Utc.from_utc_datetime(&to.and_time(last_instant));
    Ok((start, end))
}

#[derive(Debug, Args)]
pub struct DiscoverCommand {
    #[command(flatten)]
    pub scope: DiscoveryArgs,

    /// Print every discovered item
    #[arg(long)]
    pub list: bool,
}

impl DiscoverCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config()?;
        let auth = resolve_auth(&config)?;
        let options = self.scope.options(&config)?;
        let app = App::open(config).await?;

        let cancel = CancellationToken::new();
        cancel_token_on_ctrl_c(cancel.clone());

        info!(
            page_size = options.page_size,
            max_pages = options.max_pages,
            continue_previous = options.continue_previous,
            "Discovering catalog"
        );
        let result = app.service.discover(&auth, &options, &cancel).await;
        // Stops the Ctrl-C listener
        cancel.cancel();

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                formatter.error(&format!("Discovery failed: {e}"));
                return Err(e.into());
            }
        };

        if ctx.format.is_json() {
            let mut json = serde_json::json!({
                "success": true,
                "total_items": snapshot.total_items,
                "photo_count": snapshot.photo_count,
                "video_count": snapshot.video_count,
                "estimated_size_bytes": snapshot.estimated_size_bytes,
                "pages_scanned": snapshot.pages_scanned,
                "has_more": snapshot.has_more,
                "complete": snapshot.is_complete(),
                "timestamp": snapshot.timestamp.to_rfc3339(),
            });
            if self.list {
                json["items"] = serde_json::to_value(&snapshot.items)?;
            }
            formatter.print_json(&json);
        } else {
            print_snapshot(formatter.as_ref(), &snapshot);
            if self.list {
                formatter.info("");
                for item in &snapshot.items {
                    let created = item
                        .creation_time()
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    formatter.info(&format!(
                        "{created:<16}  {:<5}  {}",
                        item.media_type().to_string(),
                        item.filename()
                    ));
                }
            }
        }

        Ok(())
    }
}

pub fn print_snapshot(formatter: &dyn OutputFormatter, snapshot: &DiscoverySnapshot) {
    formatter.success(&format!(
        "Discovered {} in {}",
        plural(snapshot.total_items, "item"),
        plural(snapshot.pages_scanned as usize, "page")
    ));
    formatter.field("Photos", &snapshot.photo_count);
    formatter.field("Videos", &snapshot.video_count);
    formatter.field(
        "Estimated size",
        &human_bytes(snapshot.estimated_size_bytes),
    );
    formatter.field(
        "Scanned at",
        &snapshot.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
    );
    if let Some((start, end)) = snapshot.date_range {
        formatter.field(
            "Date range",
            &format!("{} to {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d")),
        );
    }
    if snapshot.has_more {
        formatter.info("");
        formatter.info("More items remain. Run again with --continue to fetch them.");
    }
}
