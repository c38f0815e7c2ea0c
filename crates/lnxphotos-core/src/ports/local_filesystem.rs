//! Local filesystem port (driven/secondary port)
//!
//! The orchestrator only touches the disk through this trait: create
//! directories, stream a download into a file, rename, delete, list and stat.
//!
//! ## Design Notes
//!
//! - `write_stream` owns cleanup: when it returns an error, no file remains
//!   at the target path.
//! - `write_stream` keeps source (network) and sink (disk) failures apart in
//!   [`StreamWriteError`] because they are handled differently: the former is
//!   retried, the latter is fatal to the item.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::catalog_provider::{DownloadBody, ProviderError};

/// Snapshot of a path's state on the local filesystem
#[derive(Debug, Clone)]
pub struct FileSystemState {
    /// Whether the file/directory exists on disk
    pub exists: bool,
    /// Whether this is a regular file (false for directories and other types)
    pub is_file: bool,
    /// Size in bytes (0 for directories or non-existent files)
    pub size: u64,
    /// Last modification time (None if not available or file doesn't exist)
    pub modified: Option<DateTime<Utc>>,
}

impl FileSystemState {
    /// Returns a state representing a non-existent path
    pub fn not_found() -> Self {
        Self {
            exists: false,
            is_file: false,
            size: 0,
            modified: None,
        }
    }

    /// Returns true if the file exists and is a regular file
    pub fn is_regular_file(&self) -> bool {
        self.exists && self.is_file
    }
}

/// Failure while streaming a download to disk
#[derive(Debug, Error)]
pub enum StreamWriteError {
    /// Reading from the remote body failed
    #[error("download stream failed: {0}")]
    Source(#[from] ProviderError),

    /// Writing to the local file failed
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Port for scoped local filesystem operations
#[async_trait::async_trait]
pub trait ILocalFileSystem: Send + Sync {
    /// Creates `path` and any missing parents
    async fn create_directory(&self, path: &Path) -> anyhow::Result<()>;

    /// Streams `body` into a new file at `path` and returns the bytes written
    ///
    /// The file is flushed and synced before returning. On error, the partial
    /// file is removed.
    async fn write_stream(
        &self,
        path: &Path,
        body: &mut dyn DownloadBody,
    ) -> Result<u64, StreamWriteError>;

    /// Renames `from` to `to`, replacing any existing file at `to`
    async fn rename(&self, from: &Path, to: &Path) -> anyhow::Result<()>;

    /// Removes the file at `path`; a missing file is not an error
    async fn delete_file(&self, path: &Path) -> anyhow::Result<()>;

    /// Lists the regular files directly inside `path`
    async fn list_directory(&self, path: &Path) -> anyhow::Result<Vec<PathBuf>>;

    /// Stats `path`
    async fn get_state(&self, path: &Path) -> anyhow::Result<FileSystemState>;
}
