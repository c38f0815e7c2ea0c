//! LNXPhotos Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `MediaItem`, `LedgerEntry`, `DiscoverySnapshot`, `SyncRunState`
//! - **Port definitions** - Traits for adapters: `ICatalogProvider`, `ILedgerStore`,
//!   `ISnapshotStore`, `IRunStateStore`, `ILocalFileSystem`
//! - **Configuration** - The YAML settings file read by every other crate
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement; the sync
//! engines in `lnxphotos-sync` depend only on these traits.

pub mod config;
pub mod domain;
pub mod ports;
