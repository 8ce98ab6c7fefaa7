//! Persistent, namespace-scoped vector index with incremental reconcile.
//!
//! A `VectorIndexStore` owns the vectors of one provider namespace for one
//! media folder:
//! - an immutable [`Generation`] published behind an `Arc` for readers
//! - a writer lock serializing reconciles
//! - a checksummed snapshot file replaced atomically on persist
//!
//! Queries never wait for a reconcile: they run against the last published
//! generation while the next one is being built.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancellationToken;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::index::{AnnSettings, FlatIndex, Generation, HnswConfig, IndexEntry, QueryMode, SearchResult};
use crate::media::MediaItem;
use crate::namespace::IndexNamespace;
use crate::storage::snapshot::{self, Snapshot};

/// What `open` does with a snapshot that fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionPolicy {
    /// Log a warning and start empty; the next reconcile re-embeds everything.
    #[default]
    Reset,
    /// Return [`Error::StorageCorruption`] from `open`.
    Fail,
}

/// Configuration for a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Similarity metric used by every query.
    pub metric: DistanceMetric,
    /// Expected vector length. `None` lets the first stored vector decide.
    pub dimension: Option<usize>,
    /// Embedding worker threads; 0 uses one per core.
    pub workers: usize,
    /// Items embedded between cancellation checkpoints.
    pub batch_size: usize,
    /// Graph parameters for approximate queries.
    pub hnsw: HnswConfig,
    /// Namespaces smaller than this answer approximate queries exactly.
    pub ann_min_entries: usize,
    /// Graph candidates per requested result, re-scored exactly.
    pub ann_candidate_multiplier: usize,
    pub on_corruption: CorruptionPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let ann = AnnSettings::default();
        Self {
            metric: DistanceMetric::Cosine,
            dimension: None,
            workers: 0,
            batch_size: 64,
            hnsw: ann.hnsw,
            ann_min_entries: ann.min_entries,
            ann_candidate_multiplier: ann.candidate_multiplier,
            on_corruption: CorruptionPolicy::Reset,
        }
    }
}

impl StoreConfig {
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            metric,
            ..Default::default()
        }
    }

    /// Pins the vector dimension. Chainable.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_hnsw(mut self, hnsw: HnswConfig) -> Self {
        self.hnsw = hnsw;
        self
    }

    pub fn with_ann_min_entries(mut self, min_entries: usize) -> Self {
        self.ann_min_entries = min_entries;
        self
    }

    pub fn with_ann_candidate_multiplier(mut self, multiplier: usize) -> Self {
        self.ann_candidate_multiplier = multiplier;
        self
    }

    pub fn with_corruption_policy(mut self, policy: CorruptionPolicy) -> Self {
        self.on_corruption = policy;
        self
    }

    /// Rejects values no store can run with.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == Some(0) {
            return Err(Error::ConfigurationError(
                "dimension must be positive".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(Error::ConfigurationError(
                "batch_size must be positive".into(),
            ));
        }
        if self.ann_candidate_multiplier == 0 {
            return Err(Error::ConfigurationError(
                "ann_candidate_multiplier must be positive".into(),
            ));
        }
        self.hnsw.validate()
    }

    fn ann_settings(&self) -> AnnSettings {
        AnnSettings {
            hnsw: self.hnsw.clone(),
            min_entries: self.ann_min_entries,
            candidate_multiplier: self.ann_candidate_multiplier,
        }
    }
}

/// Lifecycle of a store handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Open,
    /// A reconcile holds the writer lock. Queries still succeed.
    Reconciling,
    Closed,
}

/// One item that could not be embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of one reconcile pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// New paths embedded and stored.
    pub added: usize,
    /// Stale paths re-embedded.
    pub updated: usize,
    /// Paths no longer in the catalog, dropped from the index.
    pub removed: usize,
    /// Items whose embedding failed or was rejected.
    pub failed: usize,
    /// Items already indexed at their current mtime.
    pub unchanged: usize,
    /// Set when a cancellation stopped the pass early.
    pub cancelled: bool,
    pub failures: Vec<ReconcileFailure>,
}

impl ReconcileReport {
    /// Number of committed changes.
    pub fn changes(&self) -> usize {
        self.added + self.updated + self.removed
    }

    /// True when the pass changed nothing and nothing failed.
    pub fn is_empty(&self) -> bool {
        self.changes() == 0 && self.failed == 0
    }

    fn record_failure(&mut self, path: PathBuf, error: &Error) {
        self.failed += 1;
        self.failures.push(ReconcileFailure {
            path,
            message: error.to_string(),
        });
    }
}

/// A provider-scoped vector index persisted under one directory.
///
/// # Example
///
/// ```no_run
/// use mediavec_core::{IndexNamespace, MediaCatalogScanner, ScanConfig, StoreConfig, VectorIndexStore};
///
/// let namespace = IndexNamespace::new("toy-v1").unwrap();
/// let store = VectorIndexStore::open("/photos/.mediavec/toy", namespace, StoreConfig::default()).unwrap();
///
/// let catalog = MediaCatalogScanner::new(ScanConfig::default()).scan("/photos").unwrap();
/// let report = store
///     .reconcile(catalog, |item| Ok(vec![item.path.as_os_str().len() as f32, 1.0]))
///     .unwrap();
/// store.persist().unwrap();
/// println!("added {}", report.added);
/// ```
pub struct VectorIndexStore {
    dir: PathBuf,
    namespace: IndexNamespace,
    config: StoreConfig,
    /// Last published generation.
    current: RwLock<Arc<Generation>>,
    /// Serializes reconciles.
    writer: Mutex<()>,
    /// Generation number of the committed snapshot file.
    persisted: Mutex<Option<u64>>,
    pool: rayon::ThreadPool,
    reconciling: AtomicBool,
    closed: AtomicBool,
    recovered_from_corruption: bool,
}

impl VectorIndexStore {
    /// Opens the namespace stored in `dir`, or starts it empty.
    ///
    /// Nothing is written until the first [`persist`](Self::persist).
    ///
    /// # Errors
    ///
    /// - [`Error::ConfigurationError`] for an invalid config.
    /// - [`Error::StorageCorruption`] for an unreadable snapshot when the
    ///   policy is [`CorruptionPolicy::Fail`].
    /// - [`Error::IoError`] if the snapshot exists but cannot be read.
    #[instrument(skip_all, fields(namespace = %namespace, dir = %dir.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(dir: P, namespace: IndexNamespace, config: StoreConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        config.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("mediavec-embed-{}", i))
            .build()
            .map_err(|e| Error::ConfigurationError(format!("failed to build worker pool: {}", e)))?;

        let removed = snapshot::remove_stale_temp_files(&dir, snapshot::STALE_TEMP_AGE);
        if removed > 0 {
            debug!(removed, "removed interrupted snapshot files");
        }

        let loaded = snapshot::read(&dir, namespace.identity())
            .and_then(|s| s.map(|s| Self::restore(s, &config)).transpose());

        let (generation, persisted, recovered_from_corruption) = match loaded {
            Ok(Some(generation)) => {
                let number = generation.number();
                info!(entries = generation.len(), generation = number, "opened namespace");
                (generation, Some(number), false)
            }
            Ok(None) => (Self::empty_generation(&config), None, false),
            Err(Error::StorageCorruption(reason)) => match config.on_corruption {
                CorruptionPolicy::Fail => return Err(Error::StorageCorruption(reason)),
                CorruptionPolicy::Reset => {
                    warn!(%reason, "index snapshot unreadable, starting empty; all items will be re-embedded");
                    (Self::empty_generation(&config), None, true)
                }
            },
            Err(e) => return Err(e),
        };

        Ok(Self {
            dir,
            namespace,
            config,
            current: RwLock::new(Arc::new(generation)),
            writer: Mutex::new(()),
            persisted: Mutex::new(persisted),
            pool,
            reconciling: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            recovered_from_corruption,
        })
    }

    fn empty_generation(config: &StoreConfig) -> Generation {
        Generation::empty(config.metric, config.dimension, config.ann_settings())
    }

    /// Rebuilds a generation from a decoded snapshot.
    fn restore(snapshot: Snapshot, config: &StoreConfig) -> Result<Generation> {
        if let (Some(expected), Some(got)) = (config.dimension, snapshot.dimension) {
            if expected != got {
                return Err(Error::StorageCorruption(format!(
                    "snapshot dimension {} does not match expected {}",
                    got, expected
                )));
            }
        }
        if snapshot.metric != config.metric {
            warn!(
                stored = ?snapshot.metric,
                configured = ?config.metric,
                "snapshot was written with another metric, using the configured one"
            );
        }

        let mut index = FlatIndex::new(config.metric, config.dimension.or(snapshot.dimension));
        for entry in snapshot.entries {
            index
                .upsert(entry)
                .map_err(|e| Error::StorageCorruption(format!("invalid record: {}", e)))?;
        }
        Ok(Generation::new(snapshot.generation, index, config.ann_settings()))
    }

    /// Brings the index in line with `catalog`.
    ///
    /// See [`reconcile_with_cancel`](Self::reconcile_with_cancel).
    pub fn reconcile<I, F>(&self, catalog: I, embed: F) -> Result<ReconcileReport>
    where
        I: IntoIterator<Item = MediaItem>,
        F: Fn(&MediaItem) -> Result<Vec<f32>> + Sync,
    {
        self.reconcile_with_cancel(catalog, embed, &CancellationToken::new())
    }

    /// Brings the index in line with `catalog`, stopping early on cancel.
    ///
    /// Items that are new or whose mtime differs from the indexed one are
    /// passed to `embed` on the worker pool; paths missing from the catalog
    /// are removed. A failed embedding is counted and reported but never
    /// aborts the pass, and a failed re-embed keeps the previous vector so
    /// the next pass retries it.
    ///
    /// The result is published as a new generation in one step. Cancellation
    /// is checked before every item; work already completed is kept.
    #[instrument(skip_all, fields(namespace = %self.namespace))]
    pub fn reconcile_with_cancel<I, F>(
        &self,
        catalog: I,
        embed: F,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport>
    where
        I: IntoIterator<Item = MediaItem>,
        F: Fn(&MediaItem) -> Result<Vec<f32>> + Sync,
    {
        self.ensure_open()?;
        let _writer = self.writer.lock();
        self.ensure_open()?;
        let _reconciling = ReconcilingGuard::enter(&self.reconciling);

        let base = self.current.read().clone();
        let mut next = base.index().clone();
        let mut report = ReconcileReport::default();

        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut work: Vec<(MediaItem, bool)> = Vec::new();
        for item in catalog {
            if !seen.insert(item.path.clone()) {
                continue;
            }
            if item.path.to_str().is_none() {
                // Snapshots only hold UTF-8 paths.
                let e = Error::InvalidArgument("path is not valid UTF-8".into());
                warn!(path = %item.path.display(), error = %e, "skipping item");
                report.record_failure(item.path, &e);
                continue;
            }
            match next.get(&item.path) {
                Some(entry) if entry.indexed_mtime == item.mtime => report.unchanged += 1,
                Some(_) => work.push((item, true)),
                None => work.push((item, false)),
            }
        }

        let absent: Vec<PathBuf> = next
            .paths()
            .filter(|path| !seen.contains(*path))
            .map(Path::to_path_buf)
            .collect();
        for path in absent {
            next.remove(&path);
            report.removed += 1;
        }

        debug!(pending = work.len(), removed = report.removed, "reconcile plan");

        for batch in work.chunks(self.config.batch_size) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let outcomes: Vec<Option<Result<Vec<f32>>>> = self.pool.install(|| {
                batch
                    .par_iter()
                    .map(|(item, _)| (!cancel.is_cancelled()).then(|| embed(item)))
                    .collect()
            });

            for ((item, is_update), outcome) in batch.iter().zip(outcomes) {
                let Some(outcome) = outcome else {
                    report.cancelled = true;
                    continue;
                };
                let applied = outcome.and_then(|vector| {
                    next.upsert(IndexEntry::new(item.path.clone(), vector, item.mtime))
                });
                match applied {
                    Ok(_) if *is_update => report.updated += 1,
                    Ok(_) => report.added += 1,
                    Err(e) => {
                        warn!(path = %item.path.display(), error = %e, "failed to embed item");
                        report.record_failure(item.path.clone(), &e);
                    }
                }
            }
        }

        if report.changes() > 0 {
            let generation = Generation::new(base.number() + 1, next, self.config.ann_settings());
            *self.current.write() = Arc::new(generation);
        }

        info!(
            added = report.added,
            updated = report.updated,
            removed = report.removed,
            failed = report.failed,
            unchanged = report.unchanged,
            cancelled = report.cancelled,
            "reconcile finished"
        );
        Ok(report)
    }

    /// Durably writes the current generation.
    ///
    /// Serializing happens without any lock held; only the final rename is
    /// serialized, and it is skipped if a newer generation has already been
    /// committed by a concurrent persist.
    #[instrument(skip_all, fields(namespace = %self.namespace))]
    pub fn persist(&self) -> Result<()> {
        self.ensure_open()?;
        self.persist_generation(self.current.read().clone())
    }

    fn persist_generation(&self, generation: Arc<Generation>) -> Result<()> {
        if *self.persisted.lock() == Some(generation.number()) {
            return Ok(());
        }

        let staged = snapshot::stage(&self.dir, self.namespace.identity(), &generation)?;

        let mut persisted = self.persisted.lock();
        if persisted.is_some_and(|n| n >= generation.number()) {
            return Ok(());
        }
        staged.commit()?;
        *persisted = Some(generation.number());

        info!(
            generation = generation.number(),
            entries = generation.len(),
            "persisted namespace"
        );
        Ok(())
    }

    /// Returns the `top_k` most similar entries, best first.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `top_k` is zero.
    /// - [`Error::DimensionMismatch`] for a query of the wrong length.
    /// - [`Error::InvalidState`] once closed.
    #[instrument(level = "debug", skip(self, vector), fields(namespace = %self.namespace))]
    pub fn query(&self, vector: &[f32], top_k: usize, mode: QueryMode) -> Result<Vec<SearchResult>> {
        self.snapshot()?.query(vector, top_k, mode)
    }

    /// The last published generation, for a series of consistent reads.
    pub fn snapshot(&self) -> Result<Arc<Generation>> {
        self.ensure_open()?;
        Ok(self.current.read().clone())
    }

    /// Builds the approximate graph of the current generation ahead of use.
    pub fn warm_approximate(&self) -> Result<bool> {
        Ok(self.snapshot()?.warm_approximate())
    }

    /// Persists pending changes and closes the handle.
    ///
    /// Waits for a running reconcile to finish. Later calls fail with
    /// [`Error::InvalidState`]; closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let _writer = self.writer.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.persist_generation(self.current.read().clone());
        self.closed.store(true, Ordering::SeqCst);
        result
    }

    /// Closes without persisting; used when the namespace is being deleted.
    pub(crate) fn discard(&self) {
        let _writer = self.writer.lock();
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn state(&self) -> StoreState {
        if self.closed.load(Ordering::SeqCst) {
            StoreState::Closed
        } else if self.reconciling.load(Ordering::SeqCst) {
            StoreState::Reconciling
        } else {
            StoreState::Open
        }
    }

    /// Removes a namespace directory and everything in it.
    ///
    /// Returns false if there was nothing to remove. Handles still open on
    /// the directory keep their in-memory state.
    pub fn drop_namespace<P: AsRef<Path>>(dir: P) -> Result<bool> {
        let dir = dir.as_ref();
        match fs::remove_dir_all(dir) {
            Ok(()) => {
                info!(dir = %dir.display(), "dropped namespace");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::IoError(format!(
                "failed to remove {}: {}",
                dir.display(),
                e
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    /// Gets a copy of the stored entry for `path`.
    pub fn get(&self, path: &Path) -> Option<IndexEntry> {
        self.current.read().get(path).cloned()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.current.read().dimension()
    }

    /// Number of the last published generation.
    pub fn generation(&self) -> u64 {
        self.current.read().number()
    }

    /// True if the published generation has not been persisted.
    pub fn is_dirty(&self) -> bool {
        *self.persisted.lock() != Some(self.generation())
    }

    /// True if `open` discarded an unreadable snapshot.
    pub fn recovered_from_corruption(&self) -> bool {
        self.recovered_from_corruption
    }

    pub fn namespace(&self) -> &IndexNamespace {
        &self.namespace
    }

    /// Directory holding this namespace's snapshot.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::InvalidState(format!(
                "store for namespace {} is closed",
                self.namespace
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for VectorIndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndexStore")
            .field("dir", &self.dir)
            .field("namespace", &self.namespace.identity())
            .field("state", &self.state())
            .field("generation", &self.generation())
            .finish()
    }
}

/// Marks the store as reconciling for the guard's lifetime.
struct ReconcilingGuard<'a>(&'a AtomicBool);

impl<'a> ReconcilingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ReconcilingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaKind, Mtime};
    use std::sync::atomic::{AtomicU64, AtomicUsize};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_store_path() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir()
            .join("mediavec_test_store")
            .join(format!("store_{}_{}", std::process::id(), id));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn namespace() -> IndexNamespace {
        IndexNamespace::new("stub-v1").unwrap()
    }

    fn item(path: &str, secs: i64) -> MediaItem {
        MediaItem::new(path, MediaKind::Photo, Mtime::new(secs, 0))
    }

    /// Deterministic 2-d embedding keyed by file name length.
    fn stub_embed(item: &MediaItem) -> Result<Vec<f32>> {
        let n = item.path.as_os_str().len() as f32;
        Ok(vec![n, 1.0])
    }

    fn open(path: &Path) -> VectorIndexStore {
        VectorIndexStore::open(path, namespace(), StoreConfig::default()).unwrap()
    }

    #[test]
    fn test_reconcile_adds_and_counts() {
        let path = temp_store_path();
        let store = open(&path);

        let report = store
            .reconcile(vec![item("/p/a.jpg", 1), item("/p/bb.jpg", 1)], stub_embed)
            .unwrap();
        assert_eq!(report.added, 2);
        assert_eq!(report.changes(), 2);
        assert_eq!(store.len(), 2);
        assert_eq!(store.dimension(), Some(2));
        assert_eq!(store.generation(), 1);
        assert!(store.is_dirty());

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let path = temp_store_path();
        let store = open(&path);
        let catalog = vec![item("/p/a.jpg", 1), item("/p/b.jpg", 1)];

        store.reconcile(catalog.clone(), stub_embed).unwrap();
        let calls = AtomicUsize::new(0);
        let report = store
            .reconcile(catalog, |i| {
                calls.fetch_add(1, Ordering::SeqCst);
                stub_embed(i)
            })
            .unwrap();

        assert!(report.is_empty());
        assert_eq!(report.unchanged, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.generation(), 1);

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_reconcile_updates_stale_and_removes_absent() {
        let path = temp_store_path();
        let store = open(&path);
        store
            .reconcile(vec![item("/p/a.jpg", 1), item("/p/b.jpg", 1)], stub_embed)
            .unwrap();

        let report = store
            .reconcile(vec![item("/p/a.jpg", 2)], |_| Ok(vec![0.0, 1.0]))
            .unwrap();
        assert_eq!((report.added, report.updated, report.removed), (0, 1, 1));

        let entry = store.get(Path::new("/p/a.jpg")).unwrap();
        assert_eq!(entry.indexed_mtime, Mtime::new(2, 0));
        assert_eq!(entry.vector.as_slice(), &[0.0, 1.0]);
        assert!(store.get(Path::new("/p/b.jpg")).is_none());

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_failed_update_keeps_stale_entry() {
        let path = temp_store_path();
        let store = open(&path);
        store.reconcile(vec![item("/p/a.jpg", 1)], stub_embed).unwrap();

        let report = store
            .reconcile(vec![item("/p/a.jpg", 2)], |_| {
                Err(Error::EmbeddingUnavailable("model offline".into()))
            })
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].path, PathBuf::from("/p/a.jpg"));
        assert_eq!(
            store.get(Path::new("/p/a.jpg")).unwrap().indexed_mtime,
            Mtime::new(1, 0)
        );

        // Retried next time.
        let report = store.reconcile(vec![item("/p/a.jpg", 2)], stub_embed).unwrap();
        assert_eq!(report.updated, 1);

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_bad_vectors_are_per_item_failures() {
        let path = temp_store_path();
        let store = open(&path);

        let report = store
            .reconcile(
                vec![item("/p/a.jpg", 1), item("/p/b.jpg", 1), item("/p/c.jpg", 1)],
                |i| match i.path.to_str() {
                    Some("/p/a.jpg") => Ok(vec![1.0, 0.0]),
                    Some("/p/b.jpg") => Ok(vec![1.0, 0.0, 0.0]),
                    _ => Ok(vec![f32::NAN, 0.0]),
                },
            )
            .unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(store.len(), 1);

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_duplicate_catalog_entries_embedded_once() {
        let path = temp_store_path();
        let store = open(&path);
        let calls = AtomicUsize::new(0);

        let report = store
            .reconcile(vec![item("/p/a.jpg", 1), item("/p/a.jpg", 1)], |i| {
                calls.fetch_add(1, Ordering::SeqCst);
                stub_embed(i)
            })
            .unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_cancel_before_start() {
        let path = temp_store_path();
        let store = open(&path);
        let token = CancellationToken::new();
        token.cancel();

        let report = store
            .reconcile_with_cancel(vec![item("/p/a.jpg", 1)], stub_embed, &token)
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.added, 0);
        assert!(store.is_empty());
        assert_eq!(store.generation(), 0);

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_cancel_keeps_completed_batches() {
        let path = temp_store_path();
        let config = StoreConfig::default().with_batch_size(1).with_workers(1);
        let store = VectorIndexStore::open(&path, namespace(), config).unwrap();
        let token = CancellationToken::new();

        let catalog: Vec<_> = (0..5).map(|i| item(&format!("/p/{}.jpg", i), 1)).collect();
        let report = store
            .reconcile_with_cancel(
                catalog,
                |i| {
                    token.cancel();
                    stub_embed(i)
                },
                &token,
            )
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.added, 1);
        assert_eq!(store.len(), 1);

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_persist_and_reopen() {
        let path = temp_store_path();
        {
            let store = open(&path);
            store
                .reconcile(vec![item("/p/a.jpg", 5), item("/p/bb.jpg", 6)], stub_embed)
                .unwrap();
            store.persist().unwrap();
            assert!(!store.is_dirty());
        }

        let store = open(&path);
        assert_eq!(store.len(), 2);
        assert_eq!(store.generation(), 1);
        assert!(!store.is_dirty());
        assert!(!store.recovered_from_corruption());
        assert_eq!(
            store.get(Path::new("/p/bb.jpg")).unwrap(),
            IndexEntry::new("/p/bb.jpg", vec![9.0, 1.0], Mtime::new(6, 0))
        );

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_open_spares_another_handles_pending_persist() {
        let path = temp_store_path();
        let first = open(&path);
        first
            .reconcile(vec![item("/p/a.jpg", 1)], stub_embed)
            .unwrap();
        let staged =
            snapshot::stage(&path, first.namespace().identity(), &first.snapshot().unwrap())
                .unwrap();

        let second = open(&path);
        assert!(second.is_empty());
        staged.commit().unwrap();

        let reopened = open(&path);
        assert_eq!(reopened.len(), 1);
        let _ = fs::remove_dir_all(&path);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_path_is_item_failure() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = temp_store_path();
        let store = open(&path);
        let bad = PathBuf::from(OsStr::from_bytes(b"/p/\xff.jpg"));
        let catalog = vec![
            MediaItem::new(bad.clone(), MediaKind::Photo, Mtime::new(1, 0)),
            item("/p/a.jpg", 1),
        ];

        let report = store.reconcile(catalog, stub_embed).unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].path, bad);
        assert!(store.get(&bad).is_none());
        let _ = fs::remove_dir_all(&path);
    }

    /// Score against `[1, 0]` grows with the number in the file name.
    fn ranked_embed(item: &MediaItem) -> Result<Vec<f32>> {
        let stem = item
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<f32>().ok())
            .unwrap_or(0.0);
        Ok(vec![stem / 50.0, 1.0])
    }

    fn numbered(count: usize) -> Vec<MediaItem> {
        (0..count)
            .map(|i| item(&format!("/p/{:02}.jpg", i), 1))
            .collect()
    }

    #[test]
    fn test_approximate_results_follow_latest_generation() {
        let path = temp_store_path();
        let config = StoreConfig::default().with_ann_min_entries(10);
        let store = VectorIndexStore::open(&path, namespace(), config).unwrap();
        store.reconcile(numbered(50), ranked_embed).unwrap();

        let before = store.query(&[1.0, 0.0], 1, QueryMode::Approximate).unwrap();
        assert_eq!(before[0].path, PathBuf::from("/p/49.jpg"));
        assert!(store.snapshot().unwrap().is_approximate_ready());

        store.reconcile(numbered(49), ranked_embed).unwrap();
        let current = store.snapshot().unwrap();
        assert!(!current.is_approximate_ready());

        let after = store.query(&[1.0, 0.0], 1, QueryMode::Approximate).unwrap();
        assert_eq!(after[0].path, PathBuf::from("/p/48.jpg"));
        assert!(store
            .query(&[1.0, 0.0], 50, QueryMode::Approximate)
            .unwrap()
            .iter()
            .all(|r| r.path != Path::new("/p/49.jpg")));
        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_unpersisted_changes_are_lost() {
        let path = temp_store_path();
        {
            let store = open(&path);
            store.reconcile(vec![item("/p/a.jpg", 1)], stub_embed).unwrap();
            store.persist().unwrap();
            store.reconcile(Vec::new(), stub_embed).unwrap();
            assert!(store.is_empty());
        }
        assert_eq!(open(&path).len(), 1);

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_corrupt_snapshot_resets() {
        let path = temp_store_path();
        fs::create_dir_all(&path).unwrap();
        fs::write(snapshot::snapshot_path(&path), b"garbage").unwrap();

        let store = open(&path);
        assert!(store.recovered_from_corruption());
        assert!(store.is_empty());
        assert!(store.is_dirty());

        let strict = VectorIndexStore::open(
            &path,
            namespace(),
            StoreConfig::default().with_corruption_policy(CorruptionPolicy::Fail),
        );
        assert!(matches!(strict, Err(Error::StorageCorruption(_))));

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_foreign_namespace_snapshot_is_corruption() {
        let path = temp_store_path();
        {
            let store = open(&path);
            store.reconcile(vec![item("/p/a.jpg", 1)], stub_embed).unwrap();
            store.persist().unwrap();
        }

        let other = IndexNamespace::new("other-v2").unwrap();
        let config = StoreConfig::default().with_corruption_policy(CorruptionPolicy::Fail);
        assert!(matches!(
            VectorIndexStore::open(&path, other, config),
            Err(Error::StorageCorruption(_))
        ));

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_pinned_dimension_mismatch_on_open() {
        let path = temp_store_path();
        {
            let store = open(&path);
            store.reconcile(vec![item("/p/a.jpg", 1)], stub_embed).unwrap();
            store.persist().unwrap();
        }

        let config = StoreConfig::default()
            .with_dimension(3)
            .with_corruption_policy(CorruptionPolicy::Fail);
        assert!(matches!(
            VectorIndexStore::open(&path, namespace(), config),
            Err(Error::StorageCorruption(_))
        ));

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_query_exact_ties_by_path() {
        let path = temp_store_path();
        let store = open(&path);
        store
            .reconcile(
                vec![item("/p/b.jpg", 1), item("/p/a.jpg", 1), item("/p/c.jpg", 1)],
                |i| match i.path.to_str() {
                    Some("/p/c.jpg") => Ok(vec![1.0, 0.0]),
                    _ => Ok(vec![0.0, 1.0]),
                },
            )
            .unwrap();

        let results = store.query(&[1.0, 0.0], 3, QueryMode::Exact).unwrap();
        let paths: Vec<_> = results.iter().map(|r| r.path.to_str().unwrap()).collect();
        assert_eq!(paths, vec!["/p/c.jpg", "/p/a.jpg", "/p/b.jpg"]);

        assert!(matches!(
            store.query(&[1.0, 0.0], 0, QueryMode::Exact),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            store.query(&[1.0], 1, QueryMode::Exact),
            Err(Error::DimensionMismatch { .. })
        ));

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_closed_store_rejects_operations() {
        let path = temp_store_path();
        let store = open(&path);
        store.reconcile(vec![item("/p/a.jpg", 1)], stub_embed).unwrap();
        assert_eq!(store.state(), StoreState::Open);

        store.close().unwrap();
        assert_eq!(store.state(), StoreState::Closed);
        store.close().unwrap();

        assert!(matches!(
            store.query(&[1.0, 0.0], 1, QueryMode::Exact),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            store.reconcile(Vec::new(), stub_embed),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(store.persist(), Err(Error::InvalidState(_))));

        // close() persisted the pending generation.
        assert_eq!(open(&path).len(), 1);

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_state_while_reconciling() {
        let path = temp_store_path();
        let store = open(&path);
        let observed = Mutex::new(None);

        store
            .reconcile(vec![item("/p/a.jpg", 1)], |i| {
                *observed.lock() = Some(store.state());
                // Readers are not blocked by the writer.
                assert!(store.query(&[1.0, 0.0], 1, QueryMode::Exact).is_ok());
                stub_embed(i)
            })
            .unwrap();

        assert_eq!(*observed.lock(), Some(StoreState::Reconciling));
        assert_eq!(store.state(), StoreState::Open);

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_drop_namespace() {
        let path = temp_store_path();
        {
            let store = open(&path);
            store.reconcile(vec![item("/p/a.jpg", 1)], stub_embed).unwrap();
            store.persist().unwrap();
        }
        assert!(VectorIndexStore::drop_namespace(&path).unwrap());
        assert!(!path.exists());
        assert!(!VectorIndexStore::drop_namespace(&path).unwrap());
        assert!(open(&path).is_empty());
    }

    #[test]
    fn test_invalid_config() {
        let path = temp_store_path();
        let result =
            VectorIndexStore::open(&path, namespace(), StoreConfig::default().with_batch_size(0));
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }

    #[test]
    fn test_config_from_json() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"metric":"euclidean","workers":2,"on_corruption":"fail"}"#)
                .unwrap();
        assert_eq!(config.metric, DistanceMetric::Euclidean);
        assert_eq!(config.workers, 2);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.on_corruption, CorruptionPolicy::Fail);
    }
}
