//! Immutable committed state of a namespace.
//!
//! A [`Generation`] never changes after it is published. Readers clone an
//! `Arc<Generation>` and query it without holding any lock, while the next
//! reconcile builds its successor on the side. The approximate graph is
//! built at most once per generation, on first use.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::index::flat::{FlatIndex, IndexEntry, SearchResult};
use crate::index::hnsw::{HnswConfig, HnswIndex};

/// How a similarity query is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Score every entry. Exact top-k.
    #[default]
    Exact,
    /// Walk the HNSW graph, then re-score its candidates exactly.
    Approximate,
}

/// Approximate-search parameters shared by every generation of a store.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnSettings {
    pub hnsw: HnswConfig,
    /// Below this many entries approximate queries use the exact scan.
    pub min_entries: usize,
    /// Graph candidates fetched per requested result before re-scoring.
    pub candidate_multiplier: usize,
}

impl Default for AnnSettings {
    fn default() -> Self {
        Self {
            hnsw: HnswConfig::default(),
            min_entries: 1024,
            candidate_multiplier: 4,
        }
    }
}

struct AnnIndex {
    graph: HnswIndex,
    /// Node id -> path.
    paths: Vec<PathBuf>,
}

/// One published, read-only state of a namespace.
pub struct Generation {
    number: u64,
    index: FlatIndex,
    ann_settings: AnnSettings,
    ann: OnceLock<Option<AnnIndex>>,
}

impl Generation {
    pub fn new(number: u64, index: FlatIndex, ann_settings: AnnSettings) -> Self {
        Self {
            number,
            index,
            ann_settings,
            ann: OnceLock::new(),
        }
    }

    /// An empty generation 0.
    pub fn empty(
        metric: DistanceMetric,
        dimension: Option<usize>,
        ann_settings: AnnSettings,
    ) -> Self {
        Self::new(0, FlatIndex::new(metric, dimension), ann_settings)
    }

    /// Monotonic generation number; bumps on every committed change.
    #[inline]
    pub fn number(&self) -> u64 {
        self.number
    }

    /// The exact index backing this generation.
    #[inline]
    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.index.dimension()
    }

    #[inline]
    pub fn metric(&self) -> DistanceMetric {
        self.index.metric()
    }

    pub fn get(&self, path: &Path) -> Option<&IndexEntry> {
        self.index.get(path)
    }

    pub(crate) fn ann_settings(&self) -> &AnnSettings {
        &self.ann_settings
    }

    /// Whether the approximate graph has been built for this generation.
    pub fn is_approximate_ready(&self) -> bool {
        matches!(self.ann.get(), Some(Some(_)))
    }

    /// Builds the approximate graph now instead of on the first query.
    ///
    /// Returns whether a graph is available afterwards. Generations too small
    /// for approximate search never build one.
    pub fn warm_approximate(&self) -> bool {
        if !self.uses_graph() {
            return false;
        }
        self.ann().is_some()
    }

    /// Returns up to `top_k` results, best first.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `top_k` is zero.
    /// - [`Error::DimensionMismatch`] if the query length differs from the
    ///   namespace dimension.
    pub fn query(&self, vector: &[f32], top_k: usize, mode: QueryMode) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(Error::InvalidArgument("top_k must be at least 1".into()));
        }

        match mode {
            QueryMode::Exact => self.index.search(vector, top_k),
            QueryMode::Approximate if !self.uses_graph() => self.index.search(vector, top_k),
            QueryMode::Approximate => self.query_approximate(vector, top_k),
        }
    }

    fn uses_graph(&self) -> bool {
        !self.is_empty() && self.len() >= self.ann_settings.min_entries
    }

    fn query_approximate(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        if let Some(expected) = self.dimension() {
            if vector.len() != expected {
                return Err(Error::DimensionMismatch {
                    expected,
                    got: vector.len(),
                });
            }
        }

        let Some(ann) = self.ann() else {
            return self.index.search(vector, top_k);
        };

        let wanted = top_k
            .saturating_mul(self.ann_settings.candidate_multiplier)
            .max(top_k);
        let ef = self.ann_settings.hnsw.ef_search.max(wanted);

        let neighbors = ann.graph.search(vector, wanted, Some(ef));
        let candidates = neighbors
            .iter()
            .filter_map(|n| ann.paths.get(n.id))
            .map(PathBuf::as_path);

        Ok(self.index.rescore(vector, candidates, top_k))
    }

    fn ann(&self) -> Option<&AnnIndex> {
        self.ann
            .get_or_init(|| {
                let dimension = self.dimension()?;
                let paths: Vec<PathBuf> = self.index.paths().map(Path::to_path_buf).collect();
                let built = HnswIndex::build(
                    self.metric(),
                    dimension,
                    self.ann_settings.hnsw.clone(),
                    self.index.iter().map(|e| e.vector.as_slice().to_vec()),
                );
                match built {
                    Ok(graph) => {
                        debug!(
                            generation = self.number,
                            nodes = graph.len(),
                            "built approximate index"
                        );
                        Some(AnnIndex { graph, paths })
                    }
                    Err(e) => {
                        warn!(
                            generation = self.number,
                            error = %e,
                            "approximate index unavailable, using exact scan"
                        );
                        None
                    }
                }
            })
            .as_ref()
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generation")
            .field("number", &self.number)
            .field("len", &self.len())
            .field("dimension", &self.dimension())
            .field("metric", &self.metric())
            .field("approximate_ready", &self.is_approximate_ready())
            .finish()
    }
}
