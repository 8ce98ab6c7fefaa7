//! Media catalog scanner.
//!
//! Walks a folder and yields the media files currently on disk. The scanner
//! keeps no state between calls: every [`scan`](MediaCatalogScanner::scan)
//! starts a fresh walk, and the result is the ground truth a
//! [`VectorIndexStore`](crate::VectorIndexStore) reconciles against.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};
use crate::media::{MediaItem, MediaKind, Mtime};

/// Options for a catalog walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Follow symbolic links. Link cycles are detected and skipped.
    pub follow_links: bool,
    /// Descend into and report dot-files and dot-directories.
    pub include_hidden: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            follow_links: true,
            include_hidden: false,
        }
    }
}

impl ScanConfig {
    /// Sets whether symbolic links are followed. Chainable.
    pub fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Sets whether hidden entries are scanned. Chainable.
    pub fn with_include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }
}

/// Walks folders and recognizes photo and video files by extension.
///
/// # Example
///
/// ```no_run
/// use mediavec_core::MediaCatalogScanner;
///
/// let scanner = MediaCatalogScanner::default();
/// for item in scanner.scan("/home/me/Pictures").unwrap() {
///     println!("{:?} {}", item.kind, item.path.display());
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MediaCatalogScanner {
    config: ScanConfig,
}

impl MediaCatalogScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Starts a lazy walk of `root`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `root` does not exist or is not a
    /// directory. Problems with individual entries never fail the walk.
    pub fn scan<P: AsRef<Path>>(&self, root: P) -> Result<Catalog> {
        let root = root.as_ref();
        let root = fs::canonicalize(root).map_err(|e| {
            Error::InvalidArgument(format!("cannot resolve {}: {}", root.display(), e))
        })?;
        if !root.is_dir() {
            return Err(Error::InvalidArgument(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let predicate: fn(&DirEntry) -> bool = if self.config.include_hidden {
            keep_entry
        } else {
            not_hidden
        };

        let walker = WalkDir::new(&root)
            .follow_links(self.config.follow_links)
            .into_iter()
            .filter_entry(predicate);

        Ok(Catalog { walker })
    }

    /// Walks `root` to completion and returns the catalog sorted by path.
    pub fn scan_all<P: AsRef<Path>>(&self, root: P) -> Result<Vec<MediaItem>> {
        let mut items: Vec<MediaItem> = self.scan(root)?.collect();
        items.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(items)
    }
}

fn keep_entry(_: &DirEntry) -> bool {
    true
}

fn not_hidden(entry: &DirEntry) -> bool {
    entry.depth() == 0
        || !entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

/// A lazy, finite sequence of [`MediaItem`]s produced by one walk.
pub struct Catalog {
    walker: walkdir::FilterEntry<walkdir::IntoIter, fn(&DirEntry) -> bool>,
}

impl Iterator for Catalog {
    type Item = MediaItem;

    fn next(&mut self) -> Option<MediaItem> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    // Permission denied, link loops, vanished files.
                    debug!(error = %err, "skipping unreadable catalog entry");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let Some(kind) = MediaKind::from_path(entry.path()) else {
                continue;
            };

            if entry.path().to_str().is_none() {
                debug!(path = ?entry.path(), "skipping non UTF-8 path");
                continue;
            }

            let modified = entry
                .metadata()
                .map_err(|e| e.to_string())
                .and_then(|meta| meta.modified().map_err(|e| e.to_string()));
            let mtime = match modified {
                Ok(time) => Mtime::from(time),
                Err(err) => {
                    debug!(path = %entry.path().display(), error = %err, "skipping entry without mtime");
                    continue;
                }
            };

            return Some(MediaItem::new(entry.into_path(), kind, mtime));
        }
    }
}
