//! Domain error types
//!
//! Validation failures for newtypes and invalid run state transitions.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid media item identifier
    #[error("Invalid media item ID: {0}")]
    InvalidMediaItemId(String),

    /// Invalid catalog page token
    #[error("Invalid page token: {0}")]
    InvalidPageToken(String),

    /// Invalid user identifier
    #[error("Invalid user ID: {0}")]
    InvalidUserId(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}
