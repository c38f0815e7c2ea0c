//! Request throttling for the photo library API
//!
//! The provider enforces a per-minute request quota. [`RateLimiter`] keeps a
//! rolling one-minute counter against a ceiling set below that quota, so
//! concurrent callers in this process never trip it on their own.
//!
//! ## Behaviour
//!
//! - [`RateLimiter::acquire`] returns immediately while the current window
//!   has room and otherwise sleeps until the window rolls over.
//! - [`RateLimiter::execute`] wraps one call: acquire, call, and on HTTP 429
//!   throttle the limiter for the provider's `Retry-After` (or the
//!   configured default) and retry exactly once. A second failure is
//!   returned unchanged; retry policy beyond that belongs to the caller.
//! - A throttle holds back every caller, not only the one that was refused.
//!   The first permit after it lifts opens a fresh window.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lnxphotos_api::rate_limit::{RateLimitConfig, RateLimiter};
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(RateLimitConfig::default());
//! limiter.acquire().await;
//! // ... make API call ...
//! # }
//! ```

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lnxphotos_core::config::RateLimitingConfig;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::ApiError;

/// Length of the counting window
const WINDOW: Duration = Duration::from_secs(60);

/// Longest HTTP-date `Retry-After` we honour
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

// ============================================================================
// RateLimitConfig
// ============================================================================

/// Configuration for [`RateLimiter`]
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Permits handed out per window
    pub requests_per_minute: u32,
    /// Window length, one minute outside of tests
    pub window: Duration,
    /// Backoff used when a 429 response has no usable `Retry-After`
    pub default_retry_after: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 250,
            window: WINDOW,
            default_retry_after: Duration::from_secs(60),
        }
    }
}

impl From<&RateLimitingConfig> for RateLimitConfig {
    fn from(config: &RateLimitingConfig) -> Self {
        Self {
            requests_per_minute: config.requests_per_minute,
            window: WINDOW,
            default_retry_after: config.default_retry_after(),
        }
    }
}

// ============================================================================
// RateLimiter
// ============================================================================

#[derive(Debug, Default)]
struct Window {
    started: Option<Instant>,
    count: u32,
    /// No permits before this instant
    blocked_until: Option<Instant>,
}

/// Why [`RateLimiter::acquire`] has to wait
enum Hold {
    Throttled(Duration),
    Ceiling(Duration),
}

/// Rolling-window request limiter shared by every API call
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    window: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            window: Mutex::new(Window::default()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Window> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes one permit, waiting out a throttle first and then for the
    /// window to roll over if the ceiling has been reached.
    pub async fn acquire(&self) {
        loop {
            let wait = match self.try_take() {
                Ok(()) => return,
                Err(Hold::Throttled(wait)) => {
                    debug!(wait_ms = wait.as_millis() as u64, "Limiter throttled, waiting");
                    wait
                }
                Err(Hold::Ceiling(wait)) => {
                    debug!(
                        wait_ms = wait.as_millis() as u64,
                        ceiling = self.config.requests_per_minute,
                        "Request ceiling reached, waiting for window to roll over"
                    );
                    wait
                }
            };
            tokio::time::sleep(wait).await;
        }
    }

    fn try_take(&self) -> Result<(), Hold> {
        let mut window = self.lock();
        let now = Instant::now();

        if let Some(until) = window.blocked_until {
            if now < until {
                return Err(Hold::Throttled(until - now));
            }
            window.blocked_until = None;
            window.started = None;
        }

        let expired = window
            .started
            .map_or(true, |start| now.duration_since(start) >= self.config.window);
        if expired {
            window.started = Some(now);
            window.count = 0;
        }

        if window.count < self.config.requests_per_minute {
            window.count += 1;
            return Ok(());
        }

        Err(Hold::Ceiling(
            window
                .started
                .map(|start| (start + self.config.window).saturating_duration_since(now))
                .unwrap_or_default(),
        ))
    }

    /// Holds back every caller for `wait` from now.
    ///
    /// An earlier throttle that ends later is kept.
    pub fn throttle(&self, wait: Duration) {
        let mut window = self.lock();
        let until = Instant::now() + wait;
        if window.blocked_until.map_or(true, |current| current < until) {
            window.blocked_until = Some(until);
        }
    }

    /// Whether a throttle is in effect
    pub fn is_throttled(&self) -> bool {
        self.lock()
            .blocked_until
            .is_some_and(|until| Instant::now() < until)
    }

    /// Permits handed out in the current window
    pub fn used(&self) -> u32 {
        let window = self.lock();
        match window.started {
            Some(start) if start.elapsed() < self.config.window => window.count,
            _ => 0,
        }
    }

    /// Runs `call` under the limiter, retrying once after a 429.
    pub async fn execute<T, F, Fut>(&self, mut call: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.acquire().await;
        match call().await {
            Err(ApiError::TooManyRequests { retry_after }) => {
                let wait = retry_after.unwrap_or(self.config.default_retry_after);
                warn!(
                    retry_after_ms = wait.as_millis() as u64,
                    "Provider throttled request, backing off"
                );
                self.throttle(wait);
                self.acquire().await;
                call().await
            }
            other => other,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

// ============================================================================
// Retry-After header parsing
// ============================================================================

/// Parses the value of a `Retry-After` header.
///
/// The header can be either:
/// - An integer number of seconds (e.g., "30")
/// - An HTTP-date (e.g., "Fri, 31 Dec 2027 23:59:59 GMT") - converted to the
///   remaining time from now, capped at one hour
///
/// Returns `None` when the value cannot be used, leaving the caller to pick
/// its default.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let remaining = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        if let Ok(remaining) = remaining.to_std() {
            if remaining <= MAX_RETRY_AFTER {
                return Some(remaining);
            }
        }
    }

    warn!(value, "Could not parse Retry-After header");
    None
}
