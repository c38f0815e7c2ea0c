//! Remote media items
//!
//! A [`MediaItem`] is the photo library's description of one photo or video.
//! It is produced by catalog discovery and never mutated locally. This module
//! also owns the local naming convention, which encodes the creation
//! timestamp and an id suffix so a file can be matched back to its item
//! without consulting the ledger.

use std::fmt::{self, Display, Formatter};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::MediaItemId;

/// Suffix appended to in-progress download files
pub const PARTIAL_SUFFIX: &str = ".part";

/// `strftime` format of the timestamp prefix in local filenames
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Length of a formatted timestamp prefix, e.g. `20240131_235959`
const TIMESTAMP_LEN: usize = 15;

/// Prefix used instead of a timestamp when the item has no creation time
const UNDATED_PREFIX: &str = "undated";

/// Maximum length of the sanitized original stem kept in local filenames
const MAX_STEM_LEN: usize = 48;

/// Size guesses used when the catalog reports no dimensions
const PHOTO_FALLBACK_BYTES: u64 = 3 * 1024 * 1024;
const VIDEO_FALLBACK_BYTES: u64 = 50 * 1024 * 1024;

/// Kind of media item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Photo,
    Video,
}

impl Display for MediaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Photo => write!(f, "photo"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// A photo or video listed by the remote catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    id: MediaItemId,
    filename: String,
    media_type: MediaType,
    mime_type: Option<String>,
    width: u32,
    height: u32,
    creation_time: Option<DateTime<Utc>>,
    download_url: String,
}

impl MediaItem {
    /// Create a media item with unknown dimensions and creation time
    pub fn new(
        id: MediaItemId,
        filename: impl Into<String>,
        media_type: MediaType,
        download_url: impl Into<String>,
    ) -> Self {
        Self {
            id,
            filename: filename.into(),
            media_type,
            mime_type: None,
            width: 0,
            height: 0,
            creation_time: None,
            download_url: download_url.into(),
        }
    }

    #[must_use]
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub fn with_creation_time(mut self, creation_time: DateTime<Utc>) -> Self {
        self.creation_time = Some(creation_time);
        self
    }

    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn id(&self) -> &MediaItemId {
        &self.id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn creation_time(&self) -> Option<DateTime<Utc>> {
        self.creation_time
    }

    pub fn download_url(&self) -> &str {
        &self.download_url
    }

    pub fn is_photo(&self) -> bool {
        self.media_type == MediaType::Photo
    }

    pub fn is_video(&self) -> bool {
        self.media_type == MediaType::Video
    }

    /// Rough size guess derived from pixel dimensions.
    ///
    /// The catalog does not expose byte sizes before download. Photos are
    /// estimated at ~0.35 bytes per pixel (typical JPEG/HEIC), videos at
    /// 12 bytes per frame pixel (a short clip).
    pub fn estimated_size_bytes(&self) -> u64 {
        let pixels = u64::from(self.width) * u64::from(self.height);
        match (self.media_type, pixels) {
            (MediaType::Photo, 0) => PHOTO_FALLBACK_BYTES,
            (MediaType::Video, 0) => VIDEO_FALLBACK_BYTES,
            (MediaType::Photo, px) => px.saturating_mul(7) / 20,
            (MediaType::Video, px) => px.saturating_mul(12),
        }
    }

    /// File extension for the local copy, without the leading dot
    pub fn file_extension(&self) -> String {
        let from_name = Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(str::to_ascii_lowercase);

        if let Some(ext) = from_name {
            return ext;
        }

        let from_mime = self.mime_type.as_deref().and_then(|m| match m {
            "image/jpeg" => Some("jpg"),
            "image/png" => Some("png"),
            "image/gif" => Some("gif"),
            "image/heic" | "image/heif" => Some("heic"),
            "image/webp" => Some("webp"),
            "video/mp4" => Some("mp4"),
            "video/quicktime" => Some("mov"),
            "video/x-matroska" => Some("mkv"),
            _ => None,
        });

        match (from_mime, self.media_type) {
            (Some(ext), _) => ext.to_string(),
            (None, MediaType::Photo) => "jpg".to_string(),
            (None, MediaType::Video) => "mp4".to_string(),
        }
    }

    /// Name of the file this item is stored under in the sync directory.
    ///
    /// Format: `YYYYMMDD_HHMMSS_<stem>_<id suffix>.<ext>`, with `undated`
    /// replacing the timestamp when the catalog gave no creation time.
    pub fn local_file_name(&self) -> String {
        let prefix = match self.creation_time {
            Some(t) => t.format(TIMESTAMP_FORMAT).to_string(),
            None => UNDATED_PREFIX.to_string(),
        };
        format!(
            "{}_{}_{}.{}",
            prefix,
            self.sanitized_stem(),
            self.id.suffix(),
            self.file_extension()
        )
    }

    fn sanitized_stem(&self) -> String {
        let stem = Path::new(&self.filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();

        let cleaned: String = stem
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
            .take(MAX_STEM_LEN)
            .collect();

        if cleaned.trim_matches('-').is_empty() {
            "item".to_string()
        } else {
            cleaned
        }
    }
}

/// The identifying parts of a local filename
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalFileSignature {
    /// Formatted creation timestamp, or `undated`
    pub timestamp: String,
    /// Trailing id characters, see [`MediaItemId::suffix`]
    pub id_suffix: String,
}

impl LocalFileSignature {
    /// Signature an item's local file would carry.
    ///
    /// Items without a creation time have no signature: a bare id suffix
    /// is too weak to claim an existing file.
    pub fn of(item: &MediaItem) -> Option<Self> {
        let created = item.creation_time()?;
        Some(Self {
            timestamp: created.format(TIMESTAMP_FORMAT).to_string(),
            id_suffix: item.id().suffix(),
        })
    }

    /// Parse a filename written by [`MediaItem::local_file_name`].
    ///
    /// Returns `None` for partial downloads and for files that do not follow
    /// the naming convention.
    pub fn parse(file_name: &str) -> Option<Self> {
        if file_name.ends_with(PARTIAL_SUFFIX) {
            return None;
        }

        let stem = match file_name.rsplit_once('.') {
            Some((stem, _ext)) => stem,
            None => file_name,
        };

        let (timestamp, rest) = if let Some(rest) = stem
            .strip_prefix(UNDATED_PREFIX)
            .and_then(|r| r.strip_prefix('_'))
        {
            (UNDATED_PREFIX.to_string(), rest)
        } else {
            let ts = stem.get(..TIMESTAMP_LEN)?;
            let rest = stem.get(TIMESTAMP_LEN..)?.strip_prefix('_')?;
            if !is_timestamp(ts) {
                return None;
            }
            (ts.to_string(), rest)
        };

        let (_, suffix) = rest.rsplit_once('_')?;
        if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }

        Some(Self {
            timestamp,
            id_suffix: suffix.to_string(),
        })
    }
}

fn is_timestamp(s: &str) -> bool {
    s.len() == TIMESTAMP_LEN
        && s.char_indices().all(|(i, c)| {
            if i == 8 {
                c == '_'
            } else {
                c.is_ascii_digit()
            }
        })
}
