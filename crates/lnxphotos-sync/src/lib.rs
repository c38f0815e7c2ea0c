//! LNXPhotos Sync - Discovery and download engines
//!
//! Provides:
//! - Paged catalog discovery with caching, date filtering and continuation
//! - A persistent ledger of per-item download outcomes
//! - Bounded-concurrency downloads with pause, resume and cancellation
//! - Progress broadcasting to any number of observers
//!
//! ## Modules
//!
//! - [`discovery`] - Catalog discovery engine producing [`DiscoverySnapshot`](lnxphotos_core::domain::DiscoverySnapshot)s
//! - [`ledger`] - In-memory sync ledger with periodic durable flushes
//! - [`orchestrator`] - Download orchestrator driving one run
//! - [`control`] - Pause/resume/cancel signalling for the active run
//! - [`broadcaster`] - Progress/status fan-out
//! - [`filesystem`] - Local filesystem adapter (streamed writes, listing)
//! - [`service`] - Facade chaining discovery and download

pub mod broadcaster;
pub mod control;
pub mod discovery;
pub mod filesystem;
pub mod ledger;
pub mod orchestrator;
pub mod service;

use lnxphotos_core::domain::errors::DomainError;
use lnxphotos_core::ports::{ProviderError, StreamWriteError};
use thiserror::Error;

/// Errors that can occur during discovery and synchronization
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The credential was rejected; the user must reauthenticate
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Timeout, connection failure, throttling or a provider 5xx
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// A download ended short or empty
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// The local disk refused the write
    #[error("Storage error: {0}")]
    Storage(String),

    /// The provider rejected the request for a reason retrying won't fix
    #[error("Remote error: {0}")]
    Remote(String),

    /// Operation not allowed in the current run state
    #[error("State error: {0}")]
    State(String),

    /// Stopped by a cancellation request before producing a result
    #[error("Cancelled")]
    Cancelled,

    /// A domain-level error propagated from lnxphotos-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl SyncError {
    /// Whether the same download may succeed if attempted again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork(_) | Self::Integrity(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

impl From<ProviderError> for SyncError {
    fn from(e: ProviderError) -> Self {
        if e.is_auth() {
            SyncError::Auth(e.to_string())
        } else if e.is_transient() {
            SyncError::TransientNetwork(e.to_string())
        } else {
            SyncError::Remote(e.to_string())
        }
    }
}

impl From<StreamWriteError> for SyncError {
    fn from(e: StreamWriteError) -> Self {
        match e {
            StreamWriteError::Source(source) => source.into(),
            StreamWriteError::Io(io) => SyncError::Storage(io.to_string()),
        }
    }
}
