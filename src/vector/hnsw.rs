//! A layered HNSW (Hierarchical Navigable Small World) index over cosine
//! distance, with stable external ids decoupled from internal array
//! positions so neighbors and the graph layer above can reference nodes
//! that survive internal compaction (there isn't any: removed slots are
//! tombstoned, never reused, which keeps neighbor lists valid without a
//! generation counter).

use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::error::{Error, Result};
use crate::vector::distance::cosine_distance;

pub type ExternalId = u64;
pub type InternalId = usize;

#[derive(Debug, Clone, Copy)]
struct Scored {
    dist: f32,
    id: InternalId,
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist && self.id == other.id
    }
}
impl Eq for Scored {}
impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.total_cmp(&other.dist)
    }
}

/// Max-heap-by-distance wrapper, used to keep a bounded set of "best so
/// far" results where the worst needs to be evicted cheaply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reverse(Scored);
impl PartialOrd for Reverse {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Reverse {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.cmp(&self.0)
    }
}

struct HnswNode {
    external_id: ExternalId,
    vector: Vec<f32>,
    /// `neighbors[layer]` is this node's neighbor list at that layer.
    neighbors: Vec<Vec<InternalId>>,
}

#[derive(Debug, Clone)]
pub struct HnswConfig {
    pub dimension: usize,
    pub m: usize,
    pub ef_construction: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            dimension: 0,
            m: 16,
            ef_construction: 200,
        }
    }
}

struct Inner {
    nodes: Vec<Option<HnswNode>>,
    external_to_internal: HashMap<ExternalId, InternalId>,
    entry_point: Option<InternalId>,
}

pub struct Hnsw {
    config: HnswConfig,
    inner: RwLock<Inner>,
}

impl Hnsw {
    pub fn new(config: HnswConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner {
                nodes: Vec::new(),
                external_to_internal: HashMap::new(),
                entry_point: None,
            }),
        }
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    pub fn len(&self) -> usize {
        self.inner.read().external_to_internal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, external_id: ExternalId) -> bool {
        self.inner.read().external_to_internal.contains_key(&external_id)
    }

    fn level_for_new_node(&self) -> usize {
        let m_l = 1.0 / (self.config.m as f64).ln();
        let mut rng = rand::thread_rng();
        let uniform: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
        (-uniform.ln() * m_l).floor() as usize
    }

    /// Insert a vector under `external_id`. Fails with
    /// [`Error::DuplicateExternalId`] if the id is already present — callers
    /// that mean to change an existing node's vector must `remove` it first
    /// (which is what `UPDATE`'s embedding-column path does).
    pub fn insert(&self, external_id: ExternalId, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.config.dimension {
            return Err(Error::Validation(format!(
                "vector has dimension {} but index expects {}",
                vector.len(),
                self.config.dimension
            )));
        }

        if self.contains(external_id) {
            return Err(Error::DuplicateExternalId(external_id));
        }

        let level = self.level_for_new_node();
        let mut inner = self.inner.write();

        let internal_id = inner.nodes.len();
        inner.nodes.push(Some(HnswNode {
            external_id,
            vector: vector.clone(),
            neighbors: vec![Vec::new(); level + 1],
        }));
        inner.external_to_internal.insert(external_id, internal_id);

        let entry = match inner.entry_point {
            None => {
                inner.entry_point = Some(internal_id);
                return Ok(());
            }
            Some(e) => e,
        };

        let entry_layer = inner.nodes[entry].as_ref().unwrap().neighbors.len() - 1;
        let mut cur = entry;

        for layer in (level + 1..=entry_layer).rev() {
            cur = Self::greedy_step(&inner, cur, &vector, layer);
        }

        for layer in (0..=level.min(entry_layer)).rev() {
            let candidates = Self::search_layer(&inner, &vector, cur, self.config.ef_construction, layer);
            let selected = Self::select_neighbors(&inner, &candidates, self.neighbor_cap(layer));

            for &neighbor in &selected {
                inner.nodes[internal_id].as_mut().unwrap().neighbors[layer].push(neighbor);
                let neighbor_node = inner.nodes[neighbor].as_mut().unwrap();
                if layer < neighbor_node.neighbors.len() {
                    neighbor_node.neighbors[layer].push(internal_id);
                }
            }
            if let Some(best) = candidates.first() {
                cur = best.id;
            }

            // Re-prune every touched neighbor's list so degree caps hold.
            let cap = self.neighbor_cap(layer);
            for &neighbor in &selected {
                let neighbor_vec = inner.nodes[neighbor].as_ref().unwrap().vector.clone();
                let neighbor_layer_neighbors = inner.nodes[neighbor].as_ref().unwrap().neighbors[layer].clone();
                if neighbor_layer_neighbors.len() > cap {
                    let scored: Vec<Scored> = neighbor_layer_neighbors
                        .iter()
                        .filter_map(|&id| {
                            inner.nodes[id].as_ref().map(|n| Scored {
                                dist: cosine_distance(&neighbor_vec, &n.vector),
                                id,
                            })
                        })
                        .collect();
                    let pruned = Self::select_neighbors(&inner, &scored, cap);
                    inner.nodes[neighbor].as_mut().unwrap().neighbors[layer] = pruned;
                }
            }
        }

        if level > entry_layer {
            inner.entry_point = Some(internal_id);
        }

        Ok(())
    }

    fn neighbor_cap(&self, layer: usize) -> usize {
        if layer == 0 {
            self.config.m * 2
        } else {
            self.config.m
        }
    }

    /// Single-candidate greedy descent used above the target layer: walk to
    /// whichever neighbor is strictly closer, stop at a local optimum.
    fn greedy_step(inner: &Inner, start: InternalId, query: &[f32], layer: usize) -> InternalId {
        let mut cur = start;
        let mut cur_dist = cosine_distance(query, &inner.nodes[cur].as_ref().unwrap().vector);
        loop {
            let mut improved = false;
            let neighbors = &inner.nodes[cur].as_ref().unwrap().neighbors;
            if layer >= neighbors.len() {
                break;
            }
            for &n in &neighbors[layer] {
                if let Some(node) = inner.nodes[n].as_ref() {
                    let d = cosine_distance(query, &node.vector);
                    if d < cur_dist {
                        cur_dist = d;
                        cur = n;
                        improved = true;
                    }
                }
            }
            if !improved {
                break;
            }
        }
        cur
    }

    /// Beam search at a single layer starting from `entry`, keeping the
    /// `ef` closest candidates found. Returns them sorted ascending by
    /// distance.
    fn search_layer(inner: &Inner, query: &[f32], entry: InternalId, ef: usize, layer: usize) -> Vec<Scored> {
        let mut visited = HashSet::new();
        visited.insert(entry);

        let entry_dist = cosine_distance(query, &inner.nodes[entry].as_ref().unwrap().vector);
        let mut candidates = BinaryHeap::new(); // min-heap via Reverse
        candidates.push(Reverse(Scored { dist: entry_dist, id: entry }));
        let mut results: BinaryHeap<Scored> = BinaryHeap::new(); // max-heap, worst on top
        results.push(Scored { dist: entry_dist, id: entry });

        while let Some(Reverse(current)) = candidates.pop() {
            let worst = results.peek().map(|s| s.dist).unwrap_or(f32::INFINITY);
            if current.dist > worst && results.len() >= ef {
                break;
            }

            let neighbors = &inner.nodes[current.id].as_ref().unwrap().neighbors;
            if layer >= neighbors.len() {
                continue;
            }
            for &n in &neighbors[layer] {
                if !visited.insert(n) {
                    continue;
                }
                if let Some(node) = inner.nodes[n].as_ref() {
                    let d = cosine_distance(query, &node.vector);
                    let worst = results.peek().map(|s| s.dist).unwrap_or(f32::INFINITY);
                    if results.len() < ef || d < worst {
                        candidates.push(Reverse(Scored { dist: d, id: n }));
                        results.push(Scored { dist: d, id: n });
                        if results.len() > ef {
                            results.pop();
                        }
                    }
                }
            }
        }

        let mut out: Vec<Scored> = results.into_vec();
        out.sort_by(|a, b| a.dist.total_cmp(&b.dist));
        out
    }

    /// Diversity-aware neighbor selection: greedily keep a candidate only
    /// if it is closer to the query than to every neighbor already
    /// selected, which favors spreading neighbors around the query rather
    /// than clustering them all in one direction. Backfills with the
    /// nearest leftovers if the heuristic alone doesn't fill `cap`.
    fn select_neighbors(inner: &Inner, candidates: &[Scored], cap: usize) -> Vec<InternalId> {
        let mut sorted = candidates.to_vec();
        sorted.sort_by(|a, b| a.dist.total_cmp(&b.dist));

        let mut selected: Vec<Scored> = Vec::new();
        let mut leftovers: Vec<Scored> = Vec::new();

        for cand in sorted {
            if selected.len() >= cap {
                break;
            }
            let cand_vec = &inner.nodes[cand.id].as_ref().unwrap().vector;
            let diverse = selected.iter().all(|s| {
                let sel_vec = &inner.nodes[s.id].as_ref().unwrap().vector;
                cosine_distance(cand_vec, sel_vec) > cand.dist
            });
            if diverse {
                selected.push(cand);
            } else {
                leftovers.push(cand);
            }
        }

        for cand in leftovers {
            if selected.len() >= cap {
                break;
            }
            selected.push(cand);
        }

        selected.into_iter().map(|s| s.id).collect()
    }

    /// Search for the `k` nearest neighbors of `query`. `ef_search` is
    /// widened to at least `k` so the beam never collapses the result set
    /// below what was asked for.
    pub fn search(&self, query: &[f32], k: usize, ef_search: usize) -> Result<Vec<(ExternalId, f32)>> {
        if query.len() != self.config.dimension {
            return Err(Error::Validation(format!(
                "query vector has dimension {} but index expects {}",
                query.len(),
                self.config.dimension
            )));
        }
        let inner = self.inner.read();
        let entry = match inner.entry_point {
            Some(e) => e,
            None => return Ok(Vec::new()),
        };

        let top_layer = inner.nodes[entry].as_ref().unwrap().neighbors.len() - 1;
        let mut cur = entry;
        for layer in (1..=top_layer).rev() {
            cur = Self::greedy_step(&inner, cur, query, layer);
        }

        let ef = ef_search.max(k);
        let mut candidates = Self::search_layer(&inner, query, cur, ef, 0);
        candidates.truncate(k);
        Ok(candidates
            .into_iter()
            .map(|s| (inner.nodes[s.id].as_ref().unwrap().external_id, s.dist))
            .collect())
    }

    /// Remove a node: unlink it from every neighbor list at every layer it
    /// participated in, tombstone its slot, and promote a new entry point
    /// if it was the entry point.
    pub fn remove(&self, external_id: ExternalId) -> bool {
        let mut inner = self.inner.write();
        let internal_id = match inner.external_to_internal.remove(&external_id) {
            Some(id) => id,
            None => return false,
        };

        let layers = inner.nodes[internal_id].as_ref().unwrap().neighbors.len();
        for layer in 0..layers {
            let neighbors = inner.nodes[internal_id].as_ref().unwrap().neighbors[layer].clone();
            for n in neighbors {
                if let Some(node) = inner.nodes[n].as_mut() {
                    if layer < node.neighbors.len() {
                        node.neighbors[layer].retain(|&id| id != internal_id);
                    }
                }
            }
        }

        inner.nodes[internal_id] = None;

        if inner.entry_point == Some(internal_id) {
            inner.entry_point = inner
                .nodes
                .iter()
                .enumerate()
                .filter_map(|(id, slot)| slot.as_ref().map(|n| (id, n.neighbors.len())))
                .max_by_key(|(_, layers)| *layers)
                .map(|(id, _)| id);
        }

        true
    }

    pub fn vector_of(&self, external_id: ExternalId) -> Option<Vec<f32>> {
        let inner = self.inner.read();
        inner
            .external_to_internal
            .get(&external_id)
            .and_then(|&id| inner.nodes[id].as_ref())
            .map(|n| n.vector.clone())
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    /// Every live (external_id, vector) pair, in no particular order. Used
    /// by recovery to rebuild the index by rescan and by
    /// `save`/`load`.
    pub fn entries(&self) -> Vec<(ExternalId, Vec<f32>)> {
        let inner = self.inner.read();
        inner
            .nodes
            .iter()
            .filter_map(|slot| slot.as_ref().map(|n| (n.external_id, n.vector.clone())))
            .collect()
    }

    /// A flat, serialization-friendly snapshot of the whole graph: every
    /// live node's external id, layer neighbor lists (by external id, so
    /// the snapshot survives internal-id renumbering on load), and point
    /// bytes, plus config and the entry point's external id.
    pub fn snapshot(&self) -> HnswSnapshot {
        let inner = self.inner.read();
        let mut nodes = Vec::new();
        for slot in &inner.nodes {
            let Some(node) = slot.as_ref() else { continue };
            let neighbors: Vec<Vec<ExternalId>> = node
                .neighbors
                .iter()
                .map(|layer| {
                    layer
                        .iter()
                        .filter_map(|&id| inner.nodes[id].as_ref().map(|n| n.external_id))
                        .collect()
                })
                .collect();
            nodes.push(HnswNodeSnapshot {
                external_id: node.external_id,
                vector: node.vector.clone(),
                neighbors,
            });
        }
        let entry_point = inner.entry_point.and_then(|e| inner.nodes[e].as_ref()).map(|n| n.external_id);
        HnswSnapshot {
            dimension: self.config.dimension,
            m: self.config.m,
            ef_construction: self.config.ef_construction,
            entry_point,
            nodes,
        }
    }

    /// Rebuild an index from a snapshot, restoring internal ids in
    /// snapshot order and translating neighbor lists back from external to
    /// internal ids.
    pub fn from_snapshot(snapshot: HnswSnapshot) -> Self {
        let config = HnswConfig {
            dimension: snapshot.dimension,
            m: snapshot.m,
            ef_construction: snapshot.ef_construction,
        };
        let mut external_to_internal = HashMap::with_capacity(snapshot.nodes.len());
        for (internal_id, n) in snapshot.nodes.iter().enumerate() {
            external_to_internal.insert(n.external_id, internal_id);
        }
        let nodes = snapshot
            .nodes
            .iter()
            .map(|n| {
                let neighbors = n
                    .neighbors
                    .iter()
                    .map(|layer| {
                        layer
                            .iter()
                            .filter_map(|ext| external_to_internal.get(ext).copied())
                            .collect()
                    })
                    .collect();
                Some(HnswNode {
                    external_id: n.external_id,
                    vector: n.vector.clone(),
                    neighbors,
                })
            })
            .collect();
        let entry_point = snapshot.entry_point.and_then(|ext| external_to_internal.get(&ext).copied());
        Self {
            config,
            inner: RwLock::new(Inner {
                nodes,
                external_to_internal,
                entry_point,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswNodeSnapshot {
    pub external_id: ExternalId,
    pub vector: Vec<f32>,
    pub neighbors: Vec<Vec<ExternalId>>,
}

/// Backward-compatible on-disk shape: a v1 file (no metadata/edges) loads
/// as a v2 `VectorStore` with an empty `GraphLayer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswSnapshot {
    pub dimension: usize,
    pub m: usize,
    pub ef_construction: usize,
    pub entry_point: Option<ExternalId>,
    pub nodes: Vec<HnswNodeSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(dim: usize) -> HnswConfig {
        HnswConfig {
            dimension: dim,
            m: 8,
            ef_construction: 32,
        }
    }

    #[test]
    fn insert_then_search_returns_self_as_nearest() {
        let index = Hnsw::new(cfg(3));
        for i in 0..50u64 {
            let v = vec![i as f32, (i * 2) as f32, (i % 7) as f32];
            index.insert(i, v).unwrap();
        }
        let query = vec![10.0, 20.0, 3.0];
        let results = index.search(&query, 1, 32).unwrap();
        assert_eq!(results[0].0, 10);
    }

    #[test]
    fn search_returns_k_nearest_in_ascending_distance_order() {
        let index = Hnsw::new(cfg(2));
        for i in 0..30u64 {
            index.insert(i, vec![i as f32, 0.0]).unwrap();
        }
        let results = index.search(&[15.0, 0.0], 5, 32).unwrap();
        assert_eq!(results.len(), 5);
        for pair in results.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn removed_node_never_returned_by_search() {
        let index = Hnsw::new(cfg(2));
        for i in 0..20u64 {
            index.insert(i, vec![i as f32, 0.0]).unwrap();
        }
        index.remove(10);
        let results = index.search(&[10.0, 0.0], 20, 64).unwrap();
        assert!(results.iter().all(|(id, _)| *id != 10));
        assert_eq!(index.len(), 19);
    }

    #[test]
    fn entry_point_survives_its_own_removal() {
        let index = Hnsw::new(cfg(2));
        index.insert(0, vec![0.0, 0.0]).unwrap();
        for i in 1..10u64 {
            index.insert(i, vec![i as f32, 0.0]).unwrap();
        }
        index.remove(0);
        let results = index.search(&[5.0, 0.0], 1, 16).unwrap();
        assert!(!results.is_empty());
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let index = Hnsw::new(cfg(3));
        assert!(index.insert(0, vec![1.0, 2.0]).is_err());
        index.insert(0, vec![1.0, 2.0, 3.0]).unwrap();
        assert!(index.search(&[1.0, 2.0], 1, 16).is_err());
    }

    #[test]
    fn reinserting_same_id_fails_with_duplicate_external_id() {
        let index = Hnsw::new(cfg(2));
        index.insert(1, vec![0.0, 0.0]).unwrap();
        let err = index.insert(1, vec![100.0, 100.0]).unwrap_err();
        assert!(matches!(err, Error::DuplicateExternalId(1)));
        assert_eq!(index.len(), 1);
        assert_eq!(index.vector_of(1), Some(vec![0.0, 0.0]));
    }

    #[test]
    fn remove_then_reinsert_replaces_vector() {
        let index = Hnsw::new(cfg(2));
        index.insert(1, vec![0.0, 0.0]).unwrap();
        assert!(index.remove(1));
        index.insert(1, vec![100.0, 100.0]).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.vector_of(1), Some(vec![100.0, 100.0]));
    }

    #[test]
    fn snapshot_round_trip_preserves_search_results() {
        let index = Hnsw::new(cfg(2));
        for i in 0..40u64 {
            index.insert(i, vec![i as f32, (i % 5) as f32]).unwrap();
        }
        let before = index.search(&[20.0, 2.0], 5, 32).unwrap();

        let restored = Hnsw::from_snapshot(index.snapshot());
        let after = restored.search(&[20.0, 2.0], 5, 32).unwrap();

        assert_eq!(before, after);
        assert_eq!(restored.len(), index.len());
    }
}
