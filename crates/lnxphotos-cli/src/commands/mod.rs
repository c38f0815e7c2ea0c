//! CLI command implementations and the wiring they share

pub mod config;
pub mod discover;
pub mod failures;
pub mod status;
pub mod sync;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use lnxphotos_api::client::PhotosClient;
use lnxphotos_api::provider::PhotosCatalogProvider;
use lnxphotos_api::rate_limit::{RateLimitConfig, RateLimiter};
use lnxphotos_cache::{DatabasePool, SqliteLedgerStore, SqliteRunStateStore, SqliteSnapshotStore};
use lnxphotos_core::config::Config;
use lnxphotos_core::domain::UserId;
use lnxphotos_core::ports::{AuthContext, ICatalogProvider, ILocalFileSystem, IRunStateStore};
use lnxphotos_sync::broadcaster::ProgressBroadcaster;
use lnxphotos_sync::control::SyncController;
use lnxphotos_sync::discovery::DiscoveryEngine;
use lnxphotos_sync::filesystem::LocalFileSystemAdapter;
use lnxphotos_sync::ledger::SyncLedger;
use lnxphotos_sync::orchestrator::{DownloadOrchestrator, OrchestratorConfig};
use lnxphotos_sync::service::PhotoSyncService;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Bearer token for the library API, overriding `auth.access_token`
pub const ACCESS_TOKEN_ENV: &str = "LNXPHOTOS_ACCESS_TOKEN";
/// Library owner, overriding `auth.user_id`
pub const USER_ID_ENV: &str = "LNXPHOTOS_USER_ID";

/// Global options every command receives
#[derive(Debug, Clone)]
pub struct Context {
    pub format: OutputFormat,
    pub quiet: bool,
    pub config_path: PathBuf,
}

impl Context {
    pub fn new(format: OutputFormat, quiet: bool, config_path: PathBuf) -> Self {
        Self {
            format,
            quiet,
            config_path,
        }
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format, self.quiet)
    }

    /// Loads the config file, or defaults when there is none.
    ///
    /// A file that exists but does not parse is an error rather than a
    /// silent fallback.
    pub fn load_config(&self) -> Result<Config> {
        if !self.config_path.exists() {
            debug!(path = %self.config_path.display(), "No config file, using defaults");
            return Ok(Config::default());
        }
        Config::load(&self.config_path)
            .with_context(|| format!("Failed to load {}", self.config_path.display()))
    }
}

/// Resolves the library owner from the environment or config
pub fn resolve_user(config: &Config) -> Result<UserId> {
    let raw = std::env::var(USER_ID_ENV)
        .ok()
        .or_else(|| config.auth.user_id.clone())
        .with_context(|| format!("No user configured; set auth.user_id or {USER_ID_ENV}"))?;
    UserId::new(raw).context("Invalid user id")
}

/// Resolves the credential used for catalog and download requests
pub fn resolve_auth(config: &Config) -> Result<AuthContext> {
    let user = resolve_user(config)?;
    let token = std::env::var(ACCESS_TOKEN_ENV)
        .ok()
        .or_else(|| config.auth.access_token.clone())
        .filter(|token| !token.trim().is_empty())
        .with_context(|| {
            format!("No access token; set {ACCESS_TOKEN_ENV} or auth.access_token")
        })?;
    Ok(AuthContext::new(user, token))
}

pub async fn open_database(config: &Config) -> Result<DatabasePool> {
    DatabasePool::new(&config.storage.database)
        .await
        .with_context(|| {
            format!(
                "Failed to open state database {}",
                config.storage.database.display()
            )
        })
}

/// Fully wired engine for commands that talk to the remote library
pub struct App {
    pub config: Config,
    pub service: PhotoSyncService,
}

impl App {
    /// Opens persistent state, builds the adapters and recovers a run left
    /// behind by a previous process.
    pub async fn open(config: Config) -> Result<Self> {
        let pool = open_database(&config).await?;
        let sqlite = pool.pool().clone();

        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::from(
            &config.rate_limiting,
        )));
        let client = PhotosClient::new()
            .with_base_url(config.network.api_base_url.clone())
            .with_timeout(config.network.timeout())
            .with_rate_limiter(limiter);
        let provider: Arc<dyn ICatalogProvider> = Arc::new(PhotosCatalogProvider::new(client));
        let fs: Arc<dyn ILocalFileSystem> = Arc::new(LocalFileSystemAdapter::new());

        let ledger = Arc::new(
            SyncLedger::open(Arc::new(SqliteLedgerStore::new(sqlite.clone())), fs.clone()).await,
        );
        let run_states: Arc<dyn IRunStateStore> = Arc::new(SqliteRunStateStore::new(sqlite.clone()));
        let broadcaster = Arc::new(ProgressBroadcaster::new());

        let discovery = DiscoveryEngine::new(
            provider.clone(),
            Arc::new(SqliteSnapshotStore::new(sqlite)),
            broadcaster.clone(),
            config.discovery.cache_ttl(),
        );
        let orchestrator = DownloadOrchestrator::new(
            provider,
            fs,
            ledger,
            run_states.clone(),
            broadcaster.clone(),
            OrchestratorConfig::from(&config.sync),
        );
        let service = PhotoSyncService::new(discovery, orchestrator, run_states, broadcaster);

        if let Some(state) = service.recover_interrupted_run().await? {
            warn!(
                processed = state.processed_items,
                total = state.total_items,
                "Previous run did not finish and was marked interrupted"
            );
        }

        info!(
            database = %config.storage.database.display(),
            ledger_entries = service.ledger().len(),
            "State loaded"
        );
        Ok(Self { config, service })
    }
}

/// Cancels `controller`'s run on the first Ctrl-C.
///
/// The returned token stops the listener once the command is done.
pub fn cancel_run_on_ctrl_c(controller: SyncController) -> CancellationToken {
    let done = CancellationToken::new();
    let listener_done = done.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = listener_done.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    warn!("Interrupted, cancelling");
                    if let Err(e) = controller.cancel() {
                        debug!(error = %e, "Nothing to cancel");
                    }
                }
            }
        }
    });
    done
}

/// Cancels `token` on the first Ctrl-C
pub fn cancel_token_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    warn!("Interrupted, cancelling");
                    token.cancel();
                }
            }
        }
    });
}
