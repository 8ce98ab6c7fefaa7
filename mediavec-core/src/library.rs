//! The caller-facing entry points: reconcile a folder, search a folder.
//!
//! A `Library` resolves providers by identity, keeps one open store per
//! (folder, namespace) and persists after every reconcile, so callers only
//! deal with folders and provider names.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use crate::cancel::CancellationToken;
use crate::config::LibraryConfig;
use crate::error::{Error, Result};
use crate::expression::Expression;
use crate::index::SearchResult;
use crate::namespace::IndexNamespace;
use crate::provider::{EmbeddingProvider, ProviderRegistry};
use crate::scanner::MediaCatalogScanner;
use crate::search::SearchExecutor;
use crate::store::{ReconcileReport, StoreState, VectorIndexStore};
use crate::tags::TagSource;

/// Indexes and searches media folders with interchangeable providers.
///
/// # Example
///
/// ```no_run
/// use mediavec_core::{EmbeddingProvider, Expression, Library, LibraryConfig, ProviderRegistry, Result, TagMap};
///
/// struct Toy;
///
/// impl EmbeddingProvider for Toy {
///     fn identity(&self) -> &str { "toy-v1" }
///     fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>> {
///         Ok(vec![bytes.len() as f32, 1.0])
///     }
///     fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
///         Ok(vec![text.len() as f32, 1.0])
///     }
/// }
///
/// let library = Library::new(LibraryConfig::default(), ProviderRegistry::new().with_provider(Toy)).unwrap();
/// let report = library.reconcile("/home/me/Pictures", "toy-v1").unwrap();
/// println!("indexed {} new photos", report.added);
///
/// let tags = TagMap::new();
/// let filter = Expression::parse(["beach"]).unwrap();
/// let hits = library
///     .search("/home/me/Pictures", "toy-v1", "sunset", 10, Some(&filter), &tags)
///     .unwrap();
/// ```
pub struct Library {
    config: LibraryConfig,
    providers: ProviderRegistry,
    scanner: MediaCatalogScanner,
    /// Open stores keyed by namespace directory.
    stores: Mutex<HashMap<PathBuf, Arc<VectorIndexStore>>>,
}

impl Library {
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] for an invalid config.
    pub fn new(config: LibraryConfig, providers: ProviderRegistry) -> Result<Self> {
        config.validate()?;
        let scanner = MediaCatalogScanner::new(config.scan.clone());
        Ok(Self {
            config,
            providers,
            scanner,
            stores: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Brings the `provider` namespace of `folder` up to date and persists it.
    ///
    /// Media kinds the provider does not support are left out of the index.
    ///
    /// # Errors
    ///
    /// - [`Error::ConfigurationError`] for an unknown provider.
    /// - [`Error::InvalidArgument`] if `folder` is not a directory.
    /// - [`Error::IoError`] if persisting fails.
    ///
    /// Per-item failures are reported in the returned [`ReconcileReport`].
    pub fn reconcile<P: AsRef<Path>>(&self, folder: P, provider: &str) -> Result<ReconcileReport> {
        self.reconcile_with_cancel(folder, provider, &CancellationToken::new())
    }

    /// Like [`reconcile`](Self::reconcile), stopping early on cancel.
    ///
    /// Work completed before cancellation is committed and persisted.
    #[instrument(skip_all, fields(folder = %folder.as_ref().display(), provider = provider))]
    pub fn reconcile_with_cancel<P: AsRef<Path>>(
        &self,
        folder: P,
        provider: &str,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport> {
        let provider = self.providers.get(provider)?;
        let folder = canonical_folder(folder.as_ref())?;
        let store = self.open_store(&folder, &provider)?;

        let catalog = self
            .scanner
            .scan(&folder)?
            .filter(|item| provider.supports(item.kind));

        let report = store.reconcile_with_cancel(
            catalog,
            |item| {
                let bytes = fs::read(&item.path).map_err(|e| {
                    Error::IoError(format!("read {} failed: {}", item.path.display(), e))
                })?;
                provider.embed_media(item.kind, &bytes)
            },
            cancel,
        )?;
        if let Err(e) = store.persist() {
            warn!(
                added = report.added,
                updated = report.updated,
                removed = report.removed,
                failed = report.failed,
                error = %e,
                "reconcile applied in memory but could not be persisted"
            );
            return Err(e);
        }
        Ok(report)
    }

    /// Ranked search of `folder` with `provider`.
    ///
    /// A namespace that was never reconciled yields an empty list.
    ///
    /// # Errors
    ///
    /// - [`Error::ConfigurationError`] for an unknown provider.
    /// - [`Error::EmbeddingUnavailable`] if the query cannot be embedded.
    /// - [`Error::InvalidArgument`] for a missing folder or `top_k == 0`.
    pub fn search<P: AsRef<Path>>(
        &self,
        folder: P,
        provider: &str,
        query_text: &str,
        top_k: usize,
        filter: Option<&Expression>,
        tags: &dyn TagSource,
    ) -> Result<Vec<SearchResult>> {
        let provider = self.providers.get(provider)?;
        let folder = canonical_folder(folder.as_ref())?;
        let store = self.open_store(&folder, &provider)?;

        SearchExecutor::new(store, provider, self.config.search.clone())?
            .search(query_text, top_k, filter, tags)
    }

    /// The open store for `folder` and `provider`, opening it if needed.
    pub fn store<P: AsRef<Path>>(&self, folder: P, provider: &str) -> Result<Arc<VectorIndexStore>> {
        let provider = self.providers.get(provider)?;
        let folder = canonical_folder(folder.as_ref())?;
        self.open_store(&folder, &provider)
    }

    /// Deletes the `provider` namespace of `folder`. Other namespaces are untouched.
    pub fn drop_namespace<P: AsRef<Path>>(&self, folder: P, provider: &str) -> Result<bool> {
        let folder = canonical_folder(folder.as_ref())?;
        let dir = self.namespace_dir(&folder, provider)?;

        if let Some(store) = self.stores.lock().remove(&dir) {
            store.discard();
        }
        VectorIndexStore::drop_namespace(&dir)
    }

    /// Persists and closes every open store.
    pub fn close(&self) -> Result<()> {
        let stores: Vec<_> = self.stores.lock().drain().map(|(_, s)| s).collect();
        let mut first_error = None;
        for store in stores {
            if let Err(e) = store.close() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn namespace_dir(&self, folder: &Path, identity: &str) -> Result<PathBuf> {
        let namespace = IndexNamespace::new(identity)?;
        Ok(namespace.dir_in(&self.config.index_dir_for(folder)))
    }

    fn open_store(
        &self,
        folder: &Path,
        provider: &Arc<dyn EmbeddingProvider>,
    ) -> Result<Arc<VectorIndexStore>> {
        let namespace = IndexNamespace::new(provider.identity())?;
        let dir = namespace.dir_in(&self.config.index_dir_for(folder));

        let mut stores = self.stores.lock();
        if let Some(store) = stores.get(&dir) {
            if store.namespace().identity() != provider.identity() {
                return Err(Error::ConfigurationError(format!(
                    "providers {:?} and {:?} map to the same index directory {}",
                    store.namespace().identity(),
                    provider.identity(),
                    dir.display()
                )));
            }
            if store.state() != StoreState::Closed {
                return Ok(Arc::clone(store));
            }
        }

        let mut config = self.config.store.clone();
        if config.dimension.is_none() {
            config.dimension = provider.dimension();
        }
        let store = Arc::new(VectorIndexStore::open(&dir, namespace, config)?);
        info!(dir = %dir.display(), entries = store.len(), "opened store");
        stores.insert(dir, Arc::clone(&store));
        Ok(store)
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("config", &self.config)
            .field("providers", &self.providers)
            .field("open_stores", &self.stores.lock().len())
            .finish()
    }
}

fn canonical_folder(folder: &Path) -> Result<PathBuf> {
    let canonical = fs::canonicalize(folder).map_err(|e| {
        Error::InvalidArgument(format!("cannot resolve {}: {}", folder.display(), e))
    })?;
    if !canonical.is_dir() {
        return Err(Error::InvalidArgument(format!(
            "{} is not a directory",
            canonical.display()
        )));
    }
    Ok(canonical)
}

// Async API when tokio feature is enabled
#[cfg(feature = "async")]
mod async_api {
    use super::*;

    /// Async wrapper for [`Library`].
    ///
    /// Runs the blocking operations on tokio's blocking pool via
    /// `spawn_blocking`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use mediavec_core::{AsyncLibrary, Library, LibraryConfig, ProviderRegistry, TagMap};
    /// use std::sync::Arc;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let library = Library::new(LibraryConfig::default(), ProviderRegistry::new()).unwrap();
    ///     let library = AsyncLibrary::from_sync(library);
    ///
    ///     library.reconcile("/home/me/Pictures", "clip-b32").await.unwrap();
    ///     let hits = library
    ///         .search("/home/me/Pictures", "clip-b32", "dog on a beach", 10, None, Arc::new(TagMap::new()))
    ///         .await
    ///         .unwrap();
    /// }
    /// ```
    #[derive(Clone)]
    pub struct AsyncLibrary {
        inner: Arc<Library>,
    }

    impl AsyncLibrary {
        /// Wraps a Library in an async wrapper.
        pub fn from_sync(library: Library) -> Self {
            Self {
                inner: Arc::new(library),
            }
        }

        /// Reconciles a folder asynchronously.
        pub async fn reconcile<P: Into<PathBuf>>(
            &self,
            folder: P,
            provider: &str,
        ) -> Result<ReconcileReport> {
            self.reconcile_with_cancel(folder, provider, CancellationToken::new())
                .await
        }

        /// Reconciles a folder asynchronously; `cancel` may be triggered from any task.
        pub async fn reconcile_with_cancel<P: Into<PathBuf>>(
            &self,
            folder: P,
            provider: &str,
            cancel: CancellationToken,
        ) -> Result<ReconcileReport> {
            let inner = Arc::clone(&self.inner);
            let folder = folder.into();
            let provider = provider.to_string();
            tokio::task::spawn_blocking(move || {
                inner.reconcile_with_cancel(folder, &provider, &cancel)
            })
            .await
            .map_err(join_error)?
        }

        /// Searches a folder asynchronously.
        pub async fn search<P: Into<PathBuf>>(
            &self,
            folder: P,
            provider: &str,
            query_text: &str,
            top_k: usize,
            filter: Option<Expression>,
            tags: Arc<dyn TagSource>,
        ) -> Result<Vec<SearchResult>> {
            let inner = Arc::clone(&self.inner);
            let folder = folder.into();
            let provider = provider.to_string();
            let query_text = query_text.to_string();
            tokio::task::spawn_blocking(move || {
                inner.search(
                    folder,
                    &provider,
                    &query_text,
                    top_k,
                    filter.as_ref(),
                    tags.as_ref(),
                )
            })
            .await
            .map_err(join_error)?
        }

        /// Persists and closes every open store asynchronously.
        pub async fn close(&self) -> Result<()> {
            let inner = Arc::clone(&self.inner);
            tokio::task::spawn_blocking(move || inner.close())
                .await
                .map_err(join_error)?
        }

        /// Returns reference to inner sync library.
        pub fn inner(&self) -> &Library {
            &self.inner
        }
    }

    fn join_error(e: tokio::task::JoinError) -> Error {
        Error::InvalidState(format!("spawn_blocking failed: {}", e))
    }
}

#[cfg(feature = "async")]
pub use async_api::AsyncLibrary;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::NoTags;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_folder() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir()
            .join("mediavec_test_library")
            .join(format!("lib_{}_{}", std::process::id(), id));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Embeds the first two bytes of a file.
    struct ByteProvider(&'static str);

    impl EmbeddingProvider for ByteProvider {
        fn identity(&self) -> &str {
            self.0
        }

        fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>> {
            match bytes {
                [a, b, ..] => Ok(vec![*a as f32, *b as f32]),
                _ => Err(Error::EmbeddingUnavailable("file too short".into())),
            }
        }

        fn embed_text(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
    }

    fn library() -> Library {
        let providers = ProviderRegistry::new()
            .with_provider(ByteProvider("bytes-a"))
            .with_provider(ByteProvider("bytes-b"));
        Library::new(LibraryConfig::default(), providers).unwrap()
    }

    #[test]
    fn test_reconcile_and_search() {
        let folder = temp_folder();
        fs::write(folder.join("x.jpg"), [10u8, 0]).unwrap();
        fs::write(folder.join("y.png"), [0u8, 10]).unwrap();
        fs::write(folder.join("clip.mp4"), [10u8, 0]).unwrap();
        fs::write(folder.join("notes.txt"), b"hello").unwrap();

        let lib = library();
        let report = lib.reconcile(&folder, "bytes-a").unwrap();
        assert_eq!(report.added, 2);
        assert!(folder.join(".mediavec").is_dir());

        let hits = lib.search(&folder, "bytes-a", "q", 1, None, &NoTags).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].path.ends_with("x.jpg"));

        let _ = fs::remove_dir_all(&folder);
    }

    #[test]
    fn test_unreadable_media_is_per_item_failure() {
        let folder = temp_folder();
        fs::write(folder.join("ok.jpg"), [1u8, 2]).unwrap();
        fs::write(folder.join("short.jpg"), [1u8]).unwrap();

        let report = library().reconcile(&folder, "bytes-a").unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.failed, 1);

        let _ = fs::remove_dir_all(&folder);
    }

    #[test]
    fn test_cached_store_of_other_identity_is_rejected() {
        let folder = temp_folder();
        let lib = library();
        let canonical = canonical_folder(&folder).unwrap();
        let dir = lib.namespace_dir(&canonical, "bytes-b").unwrap();
        let foreign = VectorIndexStore::open(
            &dir,
            IndexNamespace::new("bytes-a").unwrap(),
            lib.config().store.clone(),
        )
        .unwrap();
        lib.stores.lock().insert(dir, Arc::new(foreign));

        assert!(matches!(
            lib.reconcile(&folder, "bytes-b"),
            Err(Error::ConfigurationError(_))
        ));
        let _ = fs::remove_dir_all(&folder);
    }

    #[test]
    fn test_persist_failure_keeps_applied_generation() {
        let folder = temp_folder();
        fs::write(folder.join("ok.jpg"), [1u8, 2]).unwrap();
        let lib = library();
        let store = lib.store(&folder, "bytes-a").unwrap();

        // A plain file where the namespace directory should go.
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), b"in the way").unwrap();
        assert!(matches!(
            lib.reconcile(&folder, "bytes-a"),
            Err(Error::IoError(_))
        ));
        assert_eq!(store.len(), 1);
        assert!(store.is_dirty());

        fs::remove_file(store.path()).unwrap();
        store.persist().unwrap();
        assert!(!store.is_dirty());
        let _ = fs::remove_dir_all(&folder);
    }

    #[test]
    fn test_unknown_provider() {
        let folder = temp_folder();
        let lib = library();
        assert!(matches!(
            lib.reconcile(&folder, "nope"),
            Err(Error::ConfigurationError(_))
        ));
        assert!(matches!(
            lib.search(&folder, "nope", "q", 3, None, &NoTags),
            Err(Error::ConfigurationError(_))
        ));
        let _ = fs::remove_dir_all(&folder);
    }

    #[test]
    fn test_missing_folder() {
        let lib = library();
        let missing = std::env::temp_dir().join("mediavec_test_library_missing_dir");
        assert!(matches!(
            lib.reconcile(&missing, "bytes-a"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let folder = temp_folder();
        fs::write(folder.join("x.jpg"), [3u8, 4]).unwrap();

        let lib = library();
        lib.reconcile(&folder, "bytes-a").unwrap();
        assert!(lib
            .search(&folder, "bytes-b", "q", 5, None, &NoTags)
            .unwrap()
            .is_empty());

        lib.reconcile(&folder, "bytes-b").unwrap();
        assert!(lib.drop_namespace(&folder, "bytes-a").unwrap());
        assert!(lib
            .search(&folder, "bytes-a", "q", 5, None, &NoTags)
            .unwrap()
            .is_empty());
        assert_eq!(
            lib.search(&folder, "bytes-b", "q", 5, None, &NoTags)
                .unwrap()
                .len(),
            1
        );

        let _ = fs::remove_dir_all(&folder);
    }

    #[test]
    fn test_shared_index_root() {
        let folder = temp_folder();
        let root = temp_folder();
        fs::write(folder.join("x.jpg"), [3u8, 4]).unwrap();

        let config = LibraryConfig::default().with_index_root(&root);
        let lib = Library::new(config, ProviderRegistry::new().with_provider(ByteProvider("bytes-a")))
            .unwrap();
        lib.reconcile(&folder, "bytes-a").unwrap();

        assert!(!folder.join(".mediavec").exists());
        assert_eq!(fs::read_dir(&root).unwrap().count(), 1);

        let _ = fs::remove_dir_all(&folder);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_close_then_reopen() {
        let folder = temp_folder();
        fs::write(folder.join("x.jpg"), [3u8, 4]).unwrap();

        let lib = library();
        lib.reconcile(&folder, "bytes-a").unwrap();
        let store = lib.store(&folder, "bytes-a").unwrap();
        lib.close().unwrap();
        assert_eq!(store.state(), StoreState::Closed);

        // A fresh handle is opened from disk on next use.
        assert_eq!(lib.store(&folder, "bytes-a").unwrap().len(), 1);

        let _ = fs::remove_dir_all(&folder);
    }
}
