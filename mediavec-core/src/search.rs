//! Hybrid query execution: similarity retrieval plus tag filtering.
//!
//! A search embeds the query text, pulls candidates from the store and keeps
//! those whose tags satisfy the filter expression. With a filter present the
//! executor over-fetches, because filtering happens after retrieval; if too
//! few candidates survive it widens the fetch once and tries again.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::expression::Expression;
use crate::index::{Generation, QueryMode, SearchResult};
use crate::provider::EmbeddingProvider;
use crate::store::VectorIndexStore;
use crate::tags::TagSource;
use crate::vector::check_components;

/// Tuning for [`SearchExecutor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub mode: QueryMode,
    /// Filtered searches fetch at least `top_k * overfetch_factor` candidates...
    pub overfetch_factor: usize,
    /// ...and at least `top_k + overfetch_min_extra`.
    pub overfetch_min_extra: usize,
    /// Multiplier applied to the fetch size for the single retry.
    pub widen_factor: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            mode: QueryMode::Exact,
            overfetch_factor: 4,
            overfetch_min_extra: 50,
            widen_factor: 4,
        }
    }
}

impl SearchConfig {
    pub fn with_mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_overfetch(mut self, factor: usize, min_extra: usize) -> Self {
        self.overfetch_factor = factor;
        self.overfetch_min_extra = min_extra;
        self
    }

    pub fn with_widen_factor(mut self, factor: usize) -> Self {
        self.widen_factor = factor;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.overfetch_factor == 0 || self.widen_factor == 0 {
            return Err(Error::ConfigurationError(
                "over-fetch and widen factors must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Candidates fetched in the first filtered round.
    pub fn overfetch(&self, top_k: usize) -> usize {
        top_k
            .saturating_mul(self.overfetch_factor)
            .max(top_k.saturating_add(self.overfetch_min_extra))
    }
}

/// Runs searches for one provider against one store.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use mediavec_core::*;
/// # fn demo(store: Arc<VectorIndexStore>, provider: Arc<dyn EmbeddingProvider>) -> Result<()> {
/// let executor = SearchExecutor::new(store, provider, SearchConfig::default())?;
/// let filter = Expression::parse(["beach"])?;
/// let tags = TagMap::new().with_tags("/photos/a.jpg", ["beach"]);
///
/// for hit in executor.search("sunset over the sea", 10, Some(&filter), &tags)? {
///     println!("{:.3} {}", hit.score, hit.path.display());
/// }
/// # Ok(())
/// # }
/// ```
pub struct SearchExecutor {
    store: Arc<VectorIndexStore>,
    provider: Arc<dyn EmbeddingProvider>,
    config: SearchConfig,
}

impl SearchExecutor {
    /// Binds a provider to the store holding its namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] if the provider identity does not
    /// match the store's namespace, or the config is invalid.
    pub fn new(
        store: Arc<VectorIndexStore>,
        provider: Arc<dyn EmbeddingProvider>,
        config: SearchConfig,
    ) -> Result<Self> {
        config.validate()?;
        if provider.identity() != store.namespace().identity() {
            return Err(Error::ConfigurationError(format!(
                "provider {} cannot query namespace {}",
                provider.identity(),
                store.namespace()
            )));
        }
        Ok(Self {
            store,
            provider,
            config,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<VectorIndexStore> {
        &self.store
    }

    /// Returns up to `top_k` results for `query_text`, best first.
    ///
    /// An empty or absent filter passes every candidate. An unpopulated
    /// namespace returns an empty list without calling the provider.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `top_k` is zero.
    /// - [`Error::EmbeddingUnavailable`] if the provider fails or returns an
    ///   unusable vector.
    /// - [`Error::InvalidState`] if the store is closed.
    #[instrument(skip_all, fields(namespace = %self.store.namespace(), top_k = top_k))]
    pub fn search(
        &self,
        query_text: &str,
        top_k: usize,
        filter: Option<&Expression>,
        tags: &dyn TagSource,
    ) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(Error::InvalidArgument("top_k must be at least 1".into()));
        }

        // One generation for every round, so widening sees the same data.
        let generation = self.store.snapshot()?;
        if generation.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self.embed_query(query_text)?;

        match filter.filter(|f| !f.is_empty()) {
            None => generation.query(&vector, top_k, self.config.mode),
            Some(filter) => self.filtered(&generation, &vector, top_k, filter, tags),
        }
    }

    fn embed_query(&self, query_text: &str) -> Result<Vec<f32>> {
        let vector = self
            .provider
            .embed_text(query_text)
            .map_err(Error::into_embedding_unavailable)?;
        check_components(&vector).map_err(|e| {
            Error::EmbeddingUnavailable(format!(
                "provider {} returned an unusable query vector: {}",
                self.provider.identity(),
                e
            ))
        })?;
        Ok(vector)
    }

    fn filtered(
        &self,
        generation: &Generation,
        vector: &[f32],
        top_k: usize,
        filter: &Expression,
        tags: &dyn TagSource,
    ) -> Result<Vec<SearchResult>> {
        let mut fetch = self.config.overfetch(top_k);
        let mut widened = false;

        loop {
            let candidates = generation.query(vector, fetch, self.config.mode)?;
            let fetched = candidates.len();
            let survivors: Vec<SearchResult> = candidates
                .into_iter()
                .filter(|r| filter.evaluate_for(tags, &r.path))
                .collect();

            let exhausted = fetch >= generation.len();
            debug!(
                fetch,
                fetched,
                survivors = survivors.len(),
                exhausted,
                widened,
                "filtered round"
            );
            if survivors.len() >= top_k || exhausted || widened {
                return Ok(rank(survivors, top_k));
            }
            fetch = fetch.saturating_mul(self.config.widen_factor);
            widened = true;
        }
    }
}

/// Sorts best first, keeps the best hit per path and truncates to `top_k`.
pub fn rank(mut results: Vec<SearchResult>, top_k: usize) -> Vec<SearchResult> {
    results.sort();
    let mut seen = HashSet::with_capacity(results.len());
    results.retain(|r| seen.insert(r.path.clone()));
    results.truncate(top_k);
    results
}
