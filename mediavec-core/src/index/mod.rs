//! Similarity indexes over one namespace generation.
//!
//! - [`flat`] - exact scan, also used to re-score approximate candidates
//! - [`hnsw`] - layered graph for approximate search
//! - [`generation`] - an immutable committed state combining both

pub mod flat;
pub mod generation;
pub mod hnsw;

pub use flat::{FlatIndex, IndexEntry, SearchResult};
pub use generation::{AnnSettings, Generation, QueryMode};
pub use hnsw::{HnswConfig, HnswIndex, Neighbor};
