//! The GraphRAG layer: node metadata, a type index, and typed directed
//! edges over the same external ids the HNSW index assigns, plus BFS
//! traversal.
//!
//! Built fresh using the same ownership idiom used elsewhere in this
//! crate: owned `String`s, deep clone on insert/update.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};

pub type ExternalId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub node_type: String,
    pub content_ref: Option<String>,
    pub timestamp: i64,
    pub attributes: FxHashMap<String, AttrValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub src: ExternalId,
    pub dst: ExternalId,
    pub edge_type: String,
    pub weight: f32,
}

fn edge_type_hash(edge_type: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut h = rustc_hash::FxHasher::default();
    edge_type.hash(&mut h);
    h.finish()
}

/// Node metadata plus the type index it's kept consistent with, and the
/// typed edge set plus its adjacency lists.
#[derive(Default)]
pub struct GraphLayer {
    metadata: FxHashMap<ExternalId, NodeMetadata>,
    by_type: FxHashMap<String, BTreeSet<ExternalId>>,
    edges: FxHashMap<(ExternalId, ExternalId, u64), Edge>,
    outgoing: FxHashMap<ExternalId, Vec<(ExternalId, u64)>>,
    incoming: FxHashMap<ExternalId, Vec<(ExternalId, u64)>>,
}

impl GraphLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_metadata(&mut self, id: ExternalId, metadata: NodeMetadata) {
        if let Some(old) = self.metadata.get(&id) {
            if let Some(set) = self.by_type.get_mut(&old.node_type) {
                set.remove(&id);
            }
        }
        self.by_type
            .entry(metadata.node_type.clone())
            .or_default()
            .insert(id);
        self.metadata.insert(id, metadata);
    }

    pub fn metadata(&self, id: ExternalId) -> Option<&NodeMetadata> {
        self.metadata.get(&id)
    }

    pub fn by_type(&self, node_type: &str) -> Vec<ExternalId> {
        self.by_type
            .get(node_type)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Remove a node's metadata, type-index entry, and every edge touching
    /// it (either endpoint).
    pub fn remove_node(&mut self, id: ExternalId) {
        if let Some(old) = self.metadata.remove(&id) {
            if let Some(set) = self.by_type.get_mut(&old.node_type) {
                set.remove(&id);
            }
        }
        for (other, hash) in self.outgoing.remove(&id).unwrap_or_default() {
            self.edges.remove(&(id, other, hash));
            if let Some(v) = self.incoming.get_mut(&other) {
                v.retain(|(src, h)| !(*src == id && *h == hash));
            }
        }
        for (other, hash) in self.incoming.remove(&id).unwrap_or_default() {
            self.edges.remove(&(other, id, hash));
            if let Some(v) = self.outgoing.get_mut(&other) {
                v.retain(|(dst, h)| !(*dst == id && *h == hash));
            }
        }
    }

    pub fn add_edge(&mut self, src: ExternalId, dst: ExternalId, edge_type: impl Into<String>, weight: f32) {
        let edge_type = edge_type.into();
        let hash = edge_type_hash(&edge_type);
        let key = (src, dst, hash);
        let is_new = !self.edges.contains_key(&key);
        self.edges.insert(
            key,
            Edge {
                src,
                dst,
                edge_type,
                weight,
            },
        );
        if is_new {
            self.outgoing.entry(src).or_default().push((dst, hash));
            self.incoming.entry(dst).or_default().push((src, hash));
        }
    }

    pub fn get_outgoing(&self, node: ExternalId, edge_type: Option<&str>) -> Vec<&Edge> {
        self.outgoing
            .get(&node)
            .into_iter()
            .flatten()
            .filter_map(|(dst, hash)| self.edges.get(&(node, *dst, *hash)))
            .filter(|e| edge_type.map_or(true, |t| e.edge_type == t))
            .collect()
    }

    pub fn get_incoming(&self, node: ExternalId, edge_type: Option<&str>) -> Vec<&Edge> {
        self.incoming
            .get(&node)
            .into_iter()
            .flatten()
            .filter_map(|(src, hash)| self.edges.get(&(*src, node, *hash)))
            .filter(|e| edge_type.map_or(true, |t| e.edge_type == t))
            .collect()
    }

    pub fn get_edges(&self, node: ExternalId, edge_type: Option<&str>) -> Vec<&Edge> {
        let mut edges = self.get_outgoing(node, edge_type);
        edges.extend(self.get_incoming(node, edge_type));
        edges
    }

    /// BFS from `start` up to `max_depth` hops along outgoing edges
    /// (optionally filtered by `edge_type`), returning visited nodes in
    /// discovery order, excluding `start` itself.
    pub fn traverse(&self, start: ExternalId, max_depth: usize, edge_type: Option<&str>) -> Vec<ExternalId> {
        let mut visited = HashSet::new();
        visited.insert(start);
        let mut frontier = VecDeque::new();
        frontier.push_back((start, 0usize));
        let mut order = Vec::new();

        while let Some((node, depth)) = frontier.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for edge in self.get_outgoing(node, edge_type) {
                if visited.insert(edge.dst) {
                    order.push(edge.dst);
                    frontier.push_back((edge.dst, depth + 1));
                }
            }
        }
        order
    }
}

/// Flat, serialization-friendly view of a [`GraphLayer`]'s contents.
#[derive(Serialize, Deserialize)]
pub struct PersistedGraph {
    pub metadata: Vec<(ExternalId, NodeMetadata)>,
    pub edges: Vec<Edge>,
}

impl GraphLayer {
    pub fn to_persisted(&self) -> PersistedGraph {
        PersistedGraph {
            metadata: self.metadata.iter().map(|(k, v)| (*k, v.clone())).collect(),
            edges: self.edges.values().cloned().collect(),
        }
    }

    pub fn from_persisted(persisted: PersistedGraph) -> Self {
        let mut graph = GraphLayer::new();
        for (id, metadata) in persisted.metadata {
            graph.set_metadata(id, metadata);
        }
        for edge in persisted.edges {
            graph.add_edge(edge.src, edge.dst, edge.edge_type, edge.weight);
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(t: &str) -> NodeMetadata {
        NodeMetadata {
            node_type: t.to_string(),
            content_ref: None,
            timestamp: 0,
            attributes: FxHashMap::default(),
        }
    }

    #[test]
    fn type_index_tracks_current_type_only() {
        let mut g = GraphLayer::new();
        g.set_metadata(1, meta("doc"));
        assert_eq!(g.by_type("doc"), vec![1]);
        g.set_metadata(1, meta("fn"));
        assert!(g.by_type("doc").is_empty());
        assert_eq!(g.by_type("fn"), vec![1]);
    }

    #[test]
    fn removing_node_drops_its_edges() {
        let mut g = GraphLayer::new();
        g.set_metadata(1, meta("doc"));
        g.set_metadata(2, meta("doc"));
        g.add_edge(1, 2, "refs", 1.0);
        g.remove_node(1);
        assert!(g.get_edges(2, None).is_empty());
        assert!(g.metadata(1).is_none());
    }

    #[test]
    fn distinct_edge_types_between_same_pair_coexist() {
        let mut g = GraphLayer::new();
        g.add_edge(1, 2, "calls", 1.0);
        g.add_edge(1, 2, "imports", 1.0);
        assert_eq!(g.get_outgoing(1, None).len(), 2);
    }

    #[test]
    fn traverse_excludes_start_and_handles_cycles() {
        let mut g = GraphLayer::new();
        g.add_edge(1, 2, "e", 1.0);
        g.add_edge(2, 3, "e", 1.0);
        g.add_edge(3, 1, "e", 1.0);
        let mut visited = g.traverse(1, 10, None);
        visited.sort();
        assert_eq!(visited, vec![2, 3]);
    }
}
