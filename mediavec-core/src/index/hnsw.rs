//! HNSW (Hierarchical Navigable Small World) graph for approximate search.
//!
//! The graph is layered like a skip list: layer 0 links every vector densely,
//! each higher layer holds a geometrically shrinking subset with sparser
//! links. A query descends greedily from the top layer and then runs a beam
//! search of width `ef` on layer 0.
//!
//! Nodes are addressed by dense insertion order (`0..len`), so callers keep a
//! parallel table mapping node ids back to whatever they index.
//!
//! # References
//!
//! - Malkov & Yashunin (2018): "Efficient and robust approximate nearest neighbor search using HNSW graphs"

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};

/// Configuration for the HNSW graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    /// Maximum number of connections per node above layer 0.
    /// Higher = better recall, more memory. Typical: 16-64.
    pub m: usize,
    /// Maximum connections at layer 0 (usually 2*M).
    pub m_max0: usize,
    /// Beam width during construction. Typical: 100-200.
    pub ef_construction: usize,
    /// Default beam width during search. Typical: 50-200.
    pub ef_search: usize,
    /// Seed for level assignment, so a generation always builds the same graph.
    pub seed: u64,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            m_max0: 32,
            ef_construction: 100,
            ef_search: 64,
            seed: 0x6d65_6469_6176_6563,
        }
    }
}

impl HnswConfig {
    /// Creates config with specified M parameter.
    pub fn with_m(m: usize) -> Self {
        Self {
            m,
            m_max0: m * 2,
            ..Default::default()
        }
    }

    /// Sets the construction beam width.
    pub fn with_ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef;
        self
    }

    /// Sets the default search beam width.
    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }

    /// Sets the level-assignment seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Checks the parameters describe a buildable graph.
    pub fn validate(&self) -> Result<()> {
        if self.m < 2 {
            return Err(Error::ConfigurationError(format!(
                "hnsw m must be at least 2, got {}",
                self.m
            )));
        }
        if self.m_max0 < self.m {
            return Err(Error::ConfigurationError(format!(
                "hnsw m_max0 ({}) must not be smaller than m ({})",
                self.m_max0, self.m
            )));
        }
        if self.ef_construction == 0 || self.ef_search == 0 {
            return Err(Error::ConfigurationError(
                "hnsw beam widths must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct HnswNode {
    vector: Vec<f32>,
    /// neighbors[layer] = connected node ids; `len() - 1` is the node's level.
    neighbors: Vec<Vec<usize>>,
}

impl HnswNode {
    fn new(vector: Vec<f32>, level: usize) -> Self {
        Self {
            vector,
            neighbors: vec![Vec::new(); level + 1],
        }
    }
}

/// A candidate during search, ordered by distance (min-heap).
#[derive(Debug, Clone, Copy)]
struct Candidate {
    id: usize,
    distance: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap pops the closest first.
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// A candidate for max-heap (furthest first).
#[derive(Debug, Clone, Copy)]
struct FurthestCandidate {
    id: usize,
    distance: f32,
}

impl PartialEq for FurthestCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FurthestCandidate {}

impl PartialOrd for FurthestCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FurthestCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// A graph search hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Node id (insertion order).
    pub id: usize,
    /// Distance from the query (lower = closer).
    pub distance: f32,
}

/// HNSW index for approximate nearest neighbor search.
///
/// # Example
///
/// ```
/// use mediavec_core::{DistanceMetric, HnswConfig, HnswIndex};
///
/// let mut index = HnswIndex::new(DistanceMetric::Cosine, 3, HnswConfig::default()).unwrap();
/// index.insert(vec![1.0, 0.0, 0.0]).unwrap();
/// index.insert(vec![0.9, 0.1, 0.0]).unwrap();
/// index.insert(vec![0.0, 1.0, 0.0]).unwrap();
///
/// let hits = index.search(&[1.0, 0.0, 0.0], 2, None);
/// assert_eq!(hits[0].id, 0);
/// ```
pub struct HnswIndex {
    dimension: usize,
    metric: DistanceMetric,
    config: HnswConfig,
    /// Level generation multiplier (1/ln(M)).
    ml: f64,
    /// Node with the highest level.
    entry_point: Option<usize>,
    max_level: usize,
    nodes: Vec<HnswNode>,
    rng: StdRng,
}

impl HnswIndex {
    /// Creates an empty graph.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] for unusable parameters.
    pub fn new(metric: DistanceMetric, dimension: usize, config: HnswConfig) -> Result<Self> {
        config.validate()?;
        let ml = 1.0 / (config.m as f64).ln();
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            dimension,
            metric,
            config,
            ml,
            entry_point: None,
            max_level: 0,
            nodes: Vec::new(),
            rng,
        })
    }

    /// Builds a graph from vectors in order; node `i` is the `i`-th vector.
    pub fn build<I, V>(
        metric: DistanceMetric,
        dimension: usize,
        config: HnswConfig,
        vectors: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Vec<f32>>,
    {
        let mut index = Self::new(metric, dimension, config)?;
        for vector in vectors {
            index.insert(vector)?;
        }
        Ok(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    fn random_level(&mut self) -> usize {
        // gen() is in [0, 1); map to (0, 1] so ln() stays finite.
        let r: f64 = 1.0 - self.rng.gen::<f64>();
        (-r.ln() * self.ml).floor() as usize
    }

    #[inline]
    fn distance(&self, query: &[f32], node_id: usize) -> f32 {
        self.metric.distance(query, &self.nodes[node_id].vector)
    }

    /// Inserts a vector and returns its node id.
    pub fn insert<V: Into<Vec<f32>>>(&mut self, vector: V) -> Result<usize> {
        let vector = vector.into();
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }

        let id = self.nodes.len();
        let new_level = self.random_level();
        self.nodes.push(HnswNode::new(vector, new_level));

        let Some(entry_point) = self.entry_point else {
            self.entry_point = Some(id);
            self.max_level = new_level;
            return Ok(id);
        };

        let query = self.nodes[id].vector.clone();

        // Greedy descent through the layers above the new node.
        let mut current_ep = entry_point;
        for layer in (new_level + 1..=self.max_level).rev() {
            current_ep = self.greedy_search_single(&query, current_ep, layer);
        }

        let mut ep_set = vec![current_ep];
        for layer in (0..=new_level.min(self.max_level)).rev() {
            let candidates =
                self.search_layer(&query, &ep_set, self.config.ef_construction, layer);
            let m = self.max_connections(layer);
            let neighbors = select_neighbors(&candidates, m);

            self.nodes[id].neighbors[layer] = neighbors.clone();

            for &neighbor_id in &neighbors {
                self.nodes[neighbor_id].neighbors[layer].push(id);
                if self.nodes[neighbor_id].neighbors[layer].len() > m {
                    self.prune(neighbor_id, layer, m);
                }
            }

            ep_set = candidates.iter().map(|c| c.id).collect();
        }

        if new_level > self.max_level {
            self.entry_point = Some(id);
            self.max_level = new_level;
        }

        Ok(id)
    }

    fn max_connections(&self, layer: usize) -> usize {
        if layer == 0 {
            self.config.m_max0
        } else {
            self.config.m
        }
    }

    /// Keeps the `m` closest links of a node at one layer.
    fn prune(&mut self, node_id: usize, layer: usize, m: usize) {
        let node = &self.nodes[node_id];
        let scored: Vec<Candidate> = node.neighbors[layer]
            .iter()
            .map(|&nid| Candidate {
                id: nid,
                distance: self.metric.distance(&node.vector, &self.nodes[nid].vector),
            })
            .collect();
        self.nodes[node_id].neighbors[layer] = select_neighbors(&scored, m);
    }

    fn greedy_search_single(&self, query: &[f32], entry: usize, layer: usize) -> usize {
        let mut current = entry;
        let mut current_dist = self.distance(query, current);

        loop {
            let mut changed = false;
            if let Some(links) = self.nodes[current].neighbors.get(layer) {
                for &neighbor_id in links {
                    let dist = self.distance(query, neighbor_id);
                    if dist < current_dist {
                        current = neighbor_id;
                        current_dist = dist;
                        changed = true;
                    }
                }
            }
            if !changed {
                return current;
            }
        }
    }

    /// Beam search of width `ef` on one layer; result sorted closest first.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[usize],
        ef: usize,
        layer: usize,
    ) -> Vec<Candidate> {
        let mut visited: HashSet<usize> = HashSet::new();
        let mut candidates: BinaryHeap<Candidate> = BinaryHeap::new();
        let mut results: BinaryHeap<FurthestCandidate> = BinaryHeap::new();

        for &ep in entry_points {
            if visited.insert(ep) {
                let distance = self.distance(query, ep);
                candidates.push(Candidate { id: ep, distance });
                results.push(FurthestCandidate { id: ep, distance });
            }
        }
        while results.len() > ef {
            results.pop();
        }

        while let Some(closest) = candidates.pop() {
            if let Some(furthest) = results.peek() {
                if closest.distance > furthest.distance && results.len() >= ef {
                    break;
                }
            }

            let Some(links) = self.nodes[closest.id].neighbors.get(layer) else {
                continue;
            };
            for &neighbor_id in links {
                if !visited.insert(neighbor_id) {
                    continue;
                }
                let distance = self.distance(query, neighbor_id);
                let worst = results.peek().map(|f| f.distance).unwrap_or(f32::MAX);
                if results.len() < ef || distance < worst {
                    candidates.push(Candidate {
                        id: neighbor_id,
                        distance,
                    });
                    results.push(FurthestCandidate {
                        id: neighbor_id,
                        distance,
                    });
                    while results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut sorted: Vec<Candidate> = results
            .into_iter()
            .map(|f| Candidate {
                id: f.id,
                distance: f.distance,
            })
            .collect();
        sort_closest_first(&mut sorted);
        sorted
    }

    /// Returns up to `k` approximate nearest neighbors, closest first.
    ///
    /// `ef` overrides the configured search beam; it is never narrower than
    /// `k`. A query of the wrong dimension yields no hits.
    pub fn search(&self, query: &[f32], k: usize, ef: Option<usize>) -> Vec<Neighbor> {
        if k == 0 || query.len() != self.dimension {
            return Vec::new();
        }
        let Some(entry_point) = self.entry_point else {
            return Vec::new();
        };

        let ef = ef.unwrap_or(self.config.ef_search).max(k);

        let mut current_ep = entry_point;
        for layer in (1..=self.max_level).rev() {
            current_ep = self.greedy_search_single(query, current_ep, layer);
        }

        self.search_layer(query, &[current_ep], ef, 0)
            .into_iter()
            .take(k)
            .map(|c| Neighbor {
                id: c.id,
                distance: c.distance,
            })
            .collect()
    }

    /// Gets the vector stored at a node.
    pub fn get(&self, id: usize) -> Option<&[f32]> {
        self.nodes.get(id).map(|n| n.vector.as_slice())
    }
}

fn sort_closest_first(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Simple heuristic: the `m` closest candidates.
fn select_neighbors(candidates: &[Candidate], m: usize) -> Vec<usize> {
    let mut sorted = candidates.to_vec();
    sort_closest_first(&mut sorted);
    sorted.iter().take(m).map(|c| c.id).collect()
}
