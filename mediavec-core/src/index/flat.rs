//! Flat (brute-force) index for exact similarity search.
//!
//! Scores the query against every stored vector. O(n) per query, but with
//! 100% recall, and it doubles as the authority that re-scores candidates
//! produced by the approximate graph.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::media::Mtime;
use crate::vector::Vector;

/// A single ranked hit.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Path of the matched media item.
    pub path: PathBuf,
    /// Similarity score (higher = more similar).
    pub score: f32,
}

impl SearchResult {
    pub fn new(path: PathBuf, score: f32) -> Self {
        Self { path, score }
    }
}

impl PartialEq for SearchResult {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SearchResult {}

impl PartialOrd for SearchResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchResult {
    /// Best first: higher score, then the path that sorts first as a string,
    /// so `/p/a-b.jpg` precedes `/p/a/b.jpg`.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.path.as_os_str().cmp(other.path.as_os_str()))
    }
}

/// A stored vector with the modification time it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub path: PathBuf,
    pub vector: Vector,
    /// The item's mtime when this vector was computed.
    pub indexed_mtime: Mtime,
}

impl IndexEntry {
    pub fn new(path: impl Into<PathBuf>, vector: impl Into<Vector>, indexed_mtime: Mtime) -> Self {
        Self {
            path: path.into(),
            vector: vector.into(),
            indexed_mtime,
        }
    }
}

/// Exact index over all entries of one namespace generation.
///
/// Entries are kept sorted by path and shared behind `Arc`, so cloning the
/// index to build the next generation copies pointers, not vectors.
///
/// # Example
///
/// ```
/// use mediavec_core::{DistanceMetric, FlatIndex, IndexEntry, Mtime};
///
/// let mut index = FlatIndex::new(DistanceMetric::Cosine, None);
/// index.upsert(IndexEntry::new("/p/a.jpg", vec![1.0, 0.0], Mtime::new(1, 0))).unwrap();
/// index.upsert(IndexEntry::new("/p/b.jpg", vec![0.0, 1.0], Mtime::new(1, 0))).unwrap();
///
/// let results = index.search(&[0.9, 0.1], 1).unwrap();
/// assert_eq!(results[0].path.to_str(), Some("/p/a.jpg"));
/// ```
#[derive(Debug, Clone)]
pub struct FlatIndex {
    metric: DistanceMetric,
    /// Dimension fixed by configuration; survives the index becoming empty.
    pinned_dimension: Option<usize>,
    dimension: Option<usize>,
    entries: BTreeMap<PathBuf, Arc<IndexEntry>>,
}

impl FlatIndex {
    /// Creates an empty index. With `dimension = None` the first inserted
    /// vector fixes it.
    pub fn new(metric: DistanceMetric, dimension: Option<usize>) -> Self {
        Self {
            metric,
            pinned_dimension: dimension,
            dimension,
            entries: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Vector dimension, or `None` while empty and unpinned.
    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts or replaces the entry for its path.
    ///
    /// Returns the previous entry, if any.
    ///
    /// # Errors
    ///
    /// - [`Error::DimensionMismatch`] if the vector length differs from the
    ///   index dimension.
    /// - [`Error::InvalidArgument`] for empty or non-finite vectors.
    pub fn upsert(&mut self, entry: IndexEntry) -> Result<Option<Arc<IndexEntry>>> {
        entry.vector.check()?;
        let got = entry.vector.dimension();
        match self.dimension {
            Some(expected) if expected != got => {
                return Err(Error::DimensionMismatch { expected, got });
            }
            Some(_) => {}
            None => self.dimension = Some(got),
        }

        Ok(self.entries.insert(entry.path.clone(), Arc::new(entry)))
    }

    /// Removes the entry for `path`.
    pub fn remove(&mut self, path: &Path) -> Option<Arc<IndexEntry>> {
        let removed = self.entries.remove(path);
        if self.entries.is_empty() {
            self.dimension = self.pinned_dimension;
        }
        removed
    }

    /// Gets the entry for `path`.
    pub fn get(&self, path: &Path) -> Option<&IndexEntry> {
        self.entries.get(path).map(Arc::as_ref)
    }

    /// Iterates entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> + '_ {
        self.entries.values().map(Arc::as_ref)
    }

    /// Iterates stored paths in lexical order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> + '_ {
        self.entries.keys().map(PathBuf::as_path)
    }

    /// Returns the `k` most similar entries, best first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the query length differs from
    /// the index dimension. An empty index yields an empty list.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let Some(expected) = self.dimension else {
            return Ok(Vec::new());
        };
        if query.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                got: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<SearchResult> = self
            .entries
            .values()
            .map(|entry| self.score(query, entry))
            .collect();

        candidates.sort_unstable();
        candidates.truncate(k);
        Ok(candidates)
    }

    /// Exactly scores a subset of paths and returns the best `k`.
    ///
    /// Unknown paths are ignored; duplicates are scored once.
    pub fn rescore<'a, I>(&self, query: &[f32], paths: I, k: usize) -> Vec<SearchResult>
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let mut candidates: Vec<SearchResult> = paths
            .into_iter()
            .filter_map(|path| self.entries.get(path))
            .map(|entry| self.score(query, entry))
            .collect();

        candidates.sort_unstable();
        candidates.dedup_by(|a, b| a.path == b.path);
        candidates.truncate(k);
        candidates
    }

    #[inline]
    fn score(&self, query: &[f32], entry: &IndexEntry) -> SearchResult {
        SearchResult::new(
            entry.path.clone(),
            self.metric.score(query, entry.vector.as_slice()),
        )
    }
}
