//! Media items as observed on disk.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Photo file extensions recognized by the scanner (lower case, no dot).
pub const PHOTO_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff", "heic", "heif", "avif",
];

/// Video file extensions recognized by the scanner (lower case, no dot).
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "m4v", "avi", "mkv", "webm", "wmv", "mpg", "mpeg", "3gp",
];

/// Kind of media file, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// Classifies a path by its extension (case-insensitive).
    ///
    /// Returns `None` for anything outside the allow-lists.
    ///
    /// ```
    /// use mediavec_core::MediaKind;
    /// use std::path::Path;
    ///
    /// assert_eq!(MediaKind::from_path(Path::new("a/IMG_001.JPG")), Some(MediaKind::Photo));
    /// assert_eq!(MediaKind::from_path(Path::new("clip.mov")), Some(MediaKind::Video));
    /// assert_eq!(MediaKind::from_path(Path::new("notes.txt")), None);
    /// ```
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Photo)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

/// A file modification timestamp, relative to the UNIX epoch.
///
/// Compared for exact equality: any change, forward or backward, marks an
/// index entry stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Mtime {
    /// Whole seconds; negative for timestamps before 1970.
    pub secs: i64,
    /// Sub-second nanoseconds, always in `0..1_000_000_000`.
    pub nanos: u32,
}

impl Mtime {
    /// Creates a timestamp from raw parts.
    pub fn new(secs: i64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    /// Converts a [`SystemTime`], including times before the epoch.
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => Self::new(after.as_secs() as i64, after.subsec_nanos()),
            Err(err) => {
                let before = err.duration();
                let nanos = before.subsec_nanos();
                if nanos == 0 {
                    Self::new(-(before.as_secs() as i64), 0)
                } else {
                    Self::new(-(before.as_secs() as i64) - 1, 1_000_000_000 - nanos)
                }
            }
        }
    }
}

impl From<SystemTime> for Mtime {
    fn from(time: SystemTime) -> Self {
        Self::from_system_time(time)
    }
}

/// A media file in the current on-disk catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaItem {
    /// Absolute path; unique key across the catalog and the index.
    pub path: PathBuf,
    pub kind: MediaKind,
    /// Last modification time reported by the filesystem.
    pub mtime: Mtime,
}

impl MediaItem {
    pub fn new(path: impl Into<PathBuf>, kind: MediaKind, mtime: Mtime) -> Self {
        Self {
            path: path.into(),
            kind,
            mtime,
        }
    }
}
