//! Configuration module for LNXPhotos.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//! The core only ever reads configuration; nothing here writes the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for LNXPhotos.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub discovery: DiscoveryConfig,
    pub rate_limiting: RateLimitingConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
}

/// Download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Directory the library is downloaded into.
    pub directory: PathBuf,
    /// Maximum simultaneous downloads.
    pub concurrency: usize,
    /// Download attempts per item before it is recorded as failed.
    pub max_attempts: u32,
    /// Fixed delay between attempts, in milliseconds.
    pub retry_delay_ms: u64,
    pub include_photos: bool,
    pub include_videos: bool,
    /// Delete local files whose item is no longer in the remote catalog.
    pub remove_missing: bool,
    /// Seconds between background ledger flushes.
    pub ledger_flush_interval_secs: u64,
    /// Milliseconds between checks while a run is paused.
    pub pause_poll_ms: u64,
}

/// Catalog discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Items requested per catalog page (the provider caps this at 100).
    pub page_size: u32,
    /// Pages fetched by a single discovery call.
    pub max_pages_per_call: u32,
    /// Seconds a cached snapshot stays valid.
    pub cache_ttl_secs: u64,
    /// Inclusive lower bound on item creation time.
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on item creation time.
    pub end_date: Option<DateTime<Utc>>,
}

/// Outbound request throttling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    /// Requests allowed per rolling minute. Keep below the provider quota.
    pub requests_per_minute: u32,
    /// Backoff used when a 429 response carries no `Retry-After`.
    pub default_retry_after_secs: u64,
}

/// HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Timeout applied to every network operation, in seconds.
    pub timeout_secs: u64,
    /// Base URL of the photo library API.
    pub api_base_url: String,
}

/// Local state database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

/// Credential obtained by an external OAuth flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Library owner identity used to key the snapshot cache.
    pub user_id: Option<String>,
    /// Bearer token. Usually supplied through the environment instead.
    pub access_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/lnxphotos/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("lnxphotos")
            .join("config.yaml")
    }
}

impl SyncConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn ledger_flush_interval(&self) -> Duration {
        Duration::from_secs(self.ledger_flush_interval_secs)
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }
}

impl DiscoveryConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl RateLimitingConfig {
    pub fn default_retry_after(&self) -> Duration {
        Duration::from_secs(self.default_retry_after_secs)
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            directory: dirs::picture_dir()
                .or_else(|| dirs::home_dir().map(|h| h.join("Pictures")))
                .unwrap_or_else(|| PathBuf::from("~/Pictures"))
                .join("Photos Library"),
            concurrency: 4,
            max_attempts: 3,
            retry_delay_ms: 2_000,
            include_photos: true,
            include_videos: true,
            remove_missing: false,
            ledger_flush_interval_secs: 30,
            pause_poll_ms: 500,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages_per_call: 50,
            cache_ttl_secs: 3_600,
            start_date: None,
            end_date: None,
        }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 250,
            default_retry_after_secs: 60,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            api_base_url: "https://photoslibrary.googleapis.com".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("lnxphotos")
                .join("state.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.concurrency"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Largest page the catalog API accepts.
const MAX_PAGE_SIZE: u32 = 100;

/// Upper bound on simultaneous downloads.
const MAX_CONCURRENCY: usize = 32;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ValidationError {
                field: field.into(),
                message,
            })
        };

        // --- sync ---
        if self.sync.concurrency == 0 || self.sync.concurrency > MAX_CONCURRENCY {
            push(
                "sync.concurrency",
                format!("must be in range 1..={MAX_CONCURRENCY}"),
            );
        }
        if self.sync.max_attempts == 0 {
            push("sync.max_attempts", "must be greater than 0".into());
        }
        if !self.sync.include_photos && !self.sync.include_videos {
            push(
                "sync.include_photos",
                "at least one of include_photos / include_videos must be enabled".into(),
            );
        }
        if self.sync.ledger_flush_interval_secs == 0 {
            push(
                "sync.ledger_flush_interval_secs",
                "must be greater than 0".into(),
            );
        }
        if self.sync.pause_poll_ms == 0 {
            push("sync.pause_poll_ms", "must be greater than 0".into());
        }

        // --- discovery ---
        if self.discovery.page_size == 0 || self.discovery.page_size > MAX_PAGE_SIZE {
            push(
                "discovery.page_size",
                format!("must be in range 1..={MAX_PAGE_SIZE}"),
            );
        }
        if self.discovery.max_pages_per_call == 0 {
            push(
                "discovery.max_pages_per_call",
                "must be greater than 0".into(),
            );
        }
        if let (Some(start), Some(end)) = (self.discovery.start_date, self.discovery.end_date) {
            if start > end {
                push(
                    "discovery.start_date",
                    format!("start_date ({start}) must not be after end_date ({end})"),
                );
            }
        }

        // --- rate_limiting ---
        if self.rate_limiting.requests_per_minute == 0 {
            push(
                "rate_limiting.requests_per_minute",
                "must be greater than 0".into(),
            );
        }

        // --- network ---
        if self.network.timeout_secs == 0 {
            push("network.timeout_secs", "must be greater than 0".into());
        }
        if !self.network.api_base_url.starts_with("http://")
            && !self.network.api_base_url.starts_with("https://")
        {
            push(
                "network.api_base_url",
                format!("not an http(s) URL: {}", self.network.api_base_url),
            );
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                "logging.level",
                format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use lnxphotos_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .sync_directory(PathBuf::from("/home/user/Photos"))
///     .sync_concurrency(8)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn sync_directory(mut self, directory: PathBuf) -> Self {
        self.config.sync.directory = directory;
        self
    }

    pub fn sync_concurrency(mut self, n: usize) -> Self {
        self.config.sync.concurrency = n;
        self
    }

    pub fn sync_max_attempts(mut self, n: u32) -> Self {
        self.config.sync.max_attempts = n;
        self
    }

    pub fn sync_retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.sync.retry_delay_ms = ms;
        self
    }

    pub fn sync_media_types(mut self, photos: bool, videos: bool) -> Self {
        self.config.sync.include_photos = photos;
        self.config.sync.include_videos = videos;
        self
    }

    pub fn sync_remove_missing(mut self, enabled: bool) -> Self {
        self.config.sync.remove_missing = enabled;
        self
    }

    // --- discovery ---

    pub fn discovery_page_size(mut self, n: u32) -> Self {
        self.config.discovery.page_size = n;
        self
    }

    pub fn discovery_max_pages_per_call(mut self, n: u32) -> Self {
        self.config.discovery.max_pages_per_call = n;
        self
    }

    pub fn discovery_cache_ttl_secs(mut self, seconds: u64) -> Self {
        self.config.discovery.cache_ttl_secs = seconds;
        self
    }

    pub fn discovery_date_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.config.discovery.start_date = Some(start);
        self.config.discovery.end_date = Some(end);
        self
    }

    // --- rate_limiting / network ---

    pub fn rate_limiting_requests_per_minute(mut self, n: u32) -> Self {
        self.config.rate_limiting.requests_per_minute = n;
        self
    }

    pub fn network_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.network.timeout_secs = seconds;
        self
    }

    pub fn network_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.network.api_base_url = url.into();
        self
    }

    // --- storage / logging / auth ---

    pub fn storage_database(mut self, path: PathBuf) -> Self {
        self.config.storage.database = path;
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn auth_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.config.auth.user_id = Some(user_id.into());
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
