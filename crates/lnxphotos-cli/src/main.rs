//! LNXPhotos CLI - Command-line interface for LNXPhotos
//!
//! Provides commands for:
//! - Discovering the remote photo library
//! - Downloading it into a local directory
//! - Inspecting the last run and failed items
//! - Showing and validating configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use lnxphotos_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    config::ConfigCommand, discover::DiscoverCommand, failures::FailuresCommand,
    status::StatusCommand, sync::SyncCommand, Context,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "lnxphotos",
    version,
    about = "Download and keep a local copy of your photo library"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan the remote catalog without downloading
    Discover(DiscoverCommand),
    /// Discover the catalog and download new items
    Sync(SyncCommand),
    /// Show the last run and ledger totals
    Status(StatusCommand),
    /// List items whose last download attempt failed
    Failures(FailuresCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    // Setup tracing; -v overrides the configured level
    let filter = match (cli.verbose, cli.quiet) {
        (0, true) => "warn".to_string(),
        (0, false) => Config::load(&config_path)
            .map(|config| config.logging.level)
            .unwrap_or_else(|_| "info".to_string()),
        (1, _) => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = Context::new(format, cli.quiet, config_path);

    match cli.command {
        Commands::Discover(cmd) => cmd.execute(&ctx).await,
        Commands::Sync(cmd) => cmd.execute(&ctx).await,
        Commands::Status(cmd) => cmd.execute(&ctx).await,
        Commands::Failures(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
    }
}
