//! # mediavec Core
//!
//! Core library for mediavec: an incremental embedding index and hybrid
//! query engine for local photo and video collections.
//!
//! The engine keeps one vector index per embedding provider (a *namespace*),
//! brings it in line with the files on disk by re-embedding only what
//! changed, and answers natural-language queries with optional boolean tag
//! filters written in reverse-Polish notation.
//!
//! ## Crate Features
//!
//! - `async` - Enables [`AsyncLibrary`] for tokio-compatible async operations
//!
//! ## Core Types
//!
//! ### Entry points
//!
//! - [`Library`] - `reconcile(folder, provider)` and `search(folder, provider, ...)`
//! - [`AsyncLibrary`] - Async wrapper for tokio compatibility (requires `async` feature)
//!
//! ### Indexing
//!
//! - [`MediaCatalogScanner`] - Walks a folder and yields [`MediaItem`]s
//! - [`VectorIndexStore`] - Persistent, namespace-scoped vector index
//! - [`EmbeddingProvider`] - The model capability the engine consumes
//!
//! ### Querying
//!
//! - [`SearchExecutor`] - Embed, retrieve, filter, rank
//! - [`Expression`] - RPN boolean tag expressions
//! - [`FlatIndex`] - Exact scan, O(n)
//! - [`HnswIndex`] - Approximate graph search, O(log n)
//!
//! ## Quick Start
//!
//! ```
//! use mediavec_core::prelude::*;
//!
//! let mut index = FlatIndex::new(DistanceMetric::Cosine, None);
//! index.upsert(IndexEntry::new("/p/beach.jpg", vec![0.9, 0.1], Mtime::new(0, 0))).unwrap();
//! index.upsert(IndexEntry::new("/p/forest.jpg", vec![0.1, 0.9], Mtime::new(0, 0))).unwrap();
//!
//! let filter = Expression::parse(["beach"]).unwrap();
//! let tags = TagMap::new().with_tags("/p/beach.jpg", ["beach"]);
//!
//! let hits: Vec<_> = index
//!     .search(&[1.0, 0.0], 2)
//!     .unwrap()
//!     .into_iter()
//!     .filter(|hit| filter.evaluate_for(&tags, &hit.path))
//!     .collect();
//! assert_eq!(hits.len(), 1);
//! ```

pub mod cancel;
pub mod config;
pub mod distance;
pub mod error;
pub mod expression;
pub mod index;
pub mod library;
pub mod media;
pub mod namespace;
pub mod provider;
pub mod scanner;
pub mod search;
pub mod storage;
pub mod store;
pub mod tags;
pub mod vector;

// Re-exports for convenient access
pub use cancel::CancellationToken;
pub use config::LibraryConfig;
pub use distance::DistanceMetric;
pub use error::{Error, Result};
pub use expression::{Expression, Token};
pub use index::{
    FlatIndex, Generation, HnswConfig, HnswIndex, IndexEntry, Neighbor, QueryMode, SearchResult,
};
pub use library::Library;
#[cfg(feature = "async")]
pub use library::AsyncLibrary;
pub use media::{MediaItem, MediaKind, Mtime};
pub use namespace::IndexNamespace;
pub use provider::{EmbeddingProvider, ProviderRegistry};
pub use scanner::{Catalog, MediaCatalogScanner, ScanConfig};
pub use search::{SearchConfig, SearchExecutor};
pub use store::{
    CorruptionPolicy, ReconcileFailure, ReconcileReport, StoreConfig, StoreState,
    VectorIndexStore,
};
pub use tags::{NoTags, TagMap, TagSource};
pub use vector::Vector;

/// Re-export commonly used types for convenience.
pub mod prelude {
    pub use crate::{
        CancellationToken, DistanceMetric, EmbeddingProvider, Error, Expression, FlatIndex,
        IndexEntry, Library, LibraryConfig, MediaCatalogScanner, MediaItem, MediaKind, Mtime,
        ProviderRegistry, QueryMode, Result, SearchConfig, SearchResult, StoreConfig, TagMap,
        TagSource, VectorIndexStore,
    };
}
