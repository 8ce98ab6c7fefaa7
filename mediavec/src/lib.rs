//! # mediavec
//!
//! **Semantic and tag search over local photo and video folders.**
//!
//! mediavec keeps a persistent embedding index next to (or on behalf of) a
//! media folder and answers natural-language queries against it:
//!
//! - **Incremental** - `reconcile` re-embeds only files whose modification
//!   time changed, and drops files that disappeared
//! - **Model-agnostic** - bring any [`EmbeddingProvider`]; each provider
//!   identity gets its own isolated namespace
//! - **Hybrid queries** - similarity ranking combined with boolean tag
//!   filters written in reverse-Polish notation
//! - **Crash-safe** - snapshots are checksummed and replaced atomically
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | **Query modes** | Exact scan, or HNSW candidates re-scored exactly |
//! | **Distance metrics** | Cosine, Euclidean, DotProduct |
//! | **Parallel embedding** | Bounded rayon pool, per-item failures reported |
//! | **Async API** | Tokio-compatible wrapper (feature flag) |
//!
//! ## Quick Start
//!
//! ```rust
//! use mediavec::prelude::*;
//! use std::sync::Arc;
//!
//! /// Toy provider: every file and query maps to the same direction.
//! struct Constant;
//!
//! impl EmbeddingProvider for Constant {
//!     fn identity(&self) -> &str { "constant-v1" }
//!     fn embed_image(&self, _bytes: &[u8]) -> Result<Vec<f32>> { Ok(vec![1.0, 0.0]) }
//!     fn embed_text(&self, _text: &str) -> Result<Vec<f32>> { Ok(vec![1.0, 0.0]) }
//! }
//!
//! let folder = std::env::temp_dir().join("mediavec_doc_quickstart");
//! let _ = std::fs::remove_dir_all(&folder);
//! std::fs::create_dir_all(&folder).unwrap();
//! std::fs::write(folder.join("beach.jpg"), b"...").unwrap();
//!
//! let mut providers = ProviderRegistry::new();
//! providers.register(Arc::new(Constant));
//! let library = Library::new(LibraryConfig::default(), providers).unwrap();
//!
//! let report = library.reconcile(&folder, "constant-v1").unwrap();
//! assert_eq!(report.added, 1);
//!
//! let tags = TagMap::new();
//! let hits = library.search(&folder, "constant-v1", "sunset", 5, None, &tags).unwrap();
//! assert_eq!(hits.len(), 1);
//! # std::fs::remove_dir_all(&folder).unwrap();
//! ```
//!
//! ## Tag Filters
//!
//! Filters are RPN token lists. `AND`, `OR` and `NOT` (exact upper case)
//! are operators; every other token is a tag:
//!
//! ```rust
//! use mediavec::Expression;
//!
//! // beach AND NOT blurry
//! let filter = Expression::parse(["beach", "blurry", "NOT", "AND"]).unwrap();
//! assert_eq!(filter.tags(), vec!["beach", "blurry"]);
//!
//! assert!(Expression::parse(["beach", "AND"]).is_err());
//! ```
//!
//! ## Crate Organization
//!
//! This crate re-exports everything from [`mediavec_core`]. Use
//! `mediavec::prelude::*` for the common types.

// Re-export everything from core
pub use mediavec_core::*;
