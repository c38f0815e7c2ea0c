//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the sync engines depend on; their
//! implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ICatalogProvider`] - Remote photo library (listing and downloads)
//! - [`ILedgerStore`] - Durable storage for the sync ledger
//! - [`ISnapshotStore`] - Per-user discovery snapshot cache
//! - [`IRunStateStore`] - Last run state, for crash recovery
//! - [`ILocalFileSystem`] - Scoped local filesystem operations

pub mod catalog_provider;
pub mod local_filesystem;
pub mod state_store;

pub use catalog_provider::{AuthContext, CatalogPage, DownloadBody, ICatalogProvider, ProviderError};
pub use local_filesystem::{FileSystemState, ILocalFileSystem, StreamWriteError};
pub use state_store::{ILedgerStore, IRunStateStore, ISnapshotStore};
