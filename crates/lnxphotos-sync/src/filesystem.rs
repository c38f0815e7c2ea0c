//! Local filesystem adapter (secondary/driven adapter)
//!
//! Implements [`ILocalFileSystem`] using `tokio::fs` for async file operations.
//!
//! ## Design Decisions
//!
//! - **Streamed writes**: downloads are written chunk by chunk and synced to
//!   disk before `write_stream` returns, so a file that was handed to the
//!   caller is complete.
//! - **No partial leftovers**: a drop guard removes the file if the write
//!   fails or its future is dropped halfway through.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::DateTime;
use lnxphotos_core::ports::{
    DownloadBody, FileSystemState, ILocalFileSystem, StreamWriteError,
};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

/// Adapter that bridges the [`ILocalFileSystem`] port to the real filesystem.
///
/// Zero-sized: every operation takes its context from the path arguments.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystemAdapter;

impl LocalFileSystemAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Removes the file at `path` on drop unless [`disarm`](Self::disarm)ed
struct PartialFile {
    path: Option<PathBuf>,
}

impl PartialFile {
    fn new(path: &Path) -> Self {
        Self {
            path: Some(path.to_path_buf()),
        }
    }

    fn disarm(&mut self) {
        self.path = None;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed partial file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove partial file"),
            }
        }
    }
}

#[async_trait::async_trait]
impl ILocalFileSystem for LocalFileSystemAdapter {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn create_directory(&self, path: &Path) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(path).await?;
        debug!("directory ready");
        Ok(())
    }

    #[instrument(skip(self, body), fields(path = %path.display()))]
    async fn write_stream(
        &self,
        path: &Path,
        body: &mut dyn DownloadBody,
    ) -> Result<u64, StreamWriteError> {
        let mut file = tokio::fs::File::create(path).await?;
        let mut guard = PartialFile::new(path);

        let mut written: u64 = 0;
        while let Some(chunk) = body.next_chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        guard.disarm();
        debug!(bytes = written, "stream written");
        Ok(written)
    }

    #[instrument(skip(self), fields(from = %from.display(), to = %to.display()))]
    async fn rename(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
        tokio::fs::rename(from, to).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn delete_file(&self, path: &Path) -> anyhow::Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!("file removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn list_directory(&self, path: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = match tokio::fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }

        files.sort();
        debug!(count = files.len(), "directory listed");
        Ok(files)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn get_state(&self, path: &Path) -> anyhow::Result<FileSystemState> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(FileSystemState::not_found());
            }
            Err(e) => return Err(e.into()),
        };

        let modified = metadata.modified().ok().and_then(|st| {
            st.duration_since(std::time::UNIX_EPOCH)
                .ok()
                .and_then(|dur| DateTime::from_timestamp(dur.as_secs() as i64, dur.subsec_nanos()))
        });

        Ok(FileSystemState {
            exists: true,
            is_file: metadata.is_file(),
            size: metadata.len(),
            modified,
        })
    }
}

// ============================================================================
// Unit tests
// ============================================================================
