//! Domain entities and business logic
//!
//! This module contains the core domain types for LNXPhotos:
//! - Newtypes for validated identifiers and tokens
//! - Remote media items and their local naming convention
//! - Ledger entries recording per-item sync outcomes
//! - Discovery snapshots and their continuation merge rules
//! - Run state for the download orchestrator
//! - Domain-specific error types

pub mod errors;
pub mod ledger_entry;
pub mod media_item;
pub mod newtypes;
pub mod run_state;
pub mod snapshot;

// Re-export commonly used types
pub use errors::DomainError;
pub use ledger_entry::{LedgerEntry, LedgerStats};
pub use media_item::{LocalFileSignature, MediaItem, MediaType, PARTIAL_SUFFIX};
pub use newtypes::*;
pub use run_state::{RunStatus, SyncRunState};
pub use snapshot::DiscoverySnapshot;
