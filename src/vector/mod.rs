//! The vector index: an HNSW graph over cosine distance plus a GraphRAG
//! layer of typed node metadata and typed edges keyed by the same
//! external ids, and the on-disk file format both are persisted in.

pub mod distance;
pub mod graph;
pub mod hnsw;

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use graph::{AttrValue, Edge, ExternalId, GraphLayer, NodeMetadata};
pub use hnsw::{Hnsw, HnswConfig};

const FILE_MAGIC: [u8; 8] = *b"SQLVEC01";
const FILE_VERSION: u32 = 2;

/// A vector store: the HNSW index plus the graph layer riding on its
/// external ids.
pub struct VectorStore {
    pub hnsw: Hnsw,
    pub graph: parking_lot::RwLock<GraphLayer>,
}

impl VectorStore {
    pub fn new(config: HnswConfig) -> Self {
        Self {
            hnsw: Hnsw::new(config),
            graph: parking_lot::RwLock::new(GraphLayer::new()),
        }
    }

    pub fn insert(&self, id: ExternalId, vector: Vec<f32>, metadata: Option<NodeMetadata>) -> Result<()> {
        self.hnsw.insert(id, vector)?;
        if let Some(metadata) = metadata {
            self.graph.write().set_metadata(id, metadata);
        }
        Ok(())
    }

    pub fn remove(&self, id: ExternalId) -> bool {
        let removed = self.hnsw.remove(id);
        if removed {
            self.graph.write().remove_node(id);
        }
        removed
    }

    /// Vector search restricted to a node type: oversamples the HNSW beam
    /// (doubling each retry) until `k` type-matching hits are found or the
    /// whole index has effectively been searched.
    pub fn search_by_type(&self, query: &[f32], k: usize, node_type: &str, ef_search: usize) -> Result<Vec<(ExternalId, f32)>> {
        let total = self.hnsw.len();
        let mut fetch = (k * 4).max(ef_search).min(total.max(1));
        loop {
            let candidates = self.hnsw.search(query, fetch, fetch.max(ef_search))?;
            let graph = self.graph.read();
            let matched: Vec<(ExternalId, f32)> = candidates
                .into_iter()
                .filter(|(id, _)| graph.metadata(*id).map(|m| m.node_type == node_type).unwrap_or(false))
                .collect();
            if matched.len() >= k || fetch >= total {
                let mut out = matched;
                out.truncate(k);
                return Ok(out);
            }
            fetch = (fetch * 2).min(total.max(fetch + 1));
        }
    }

    /// Vector search followed by a graph traversal from each hit: returns
    /// the union of the top-k vector hits and everything reachable from
    /// them within `depth` hops, with the original vector hits kept first
    /// and in their original order.
    pub fn search_then_traverse(
        &self,
        query: &[f32],
        k: usize,
        edge_type: Option<&str>,
        depth: usize,
        ef_search: usize,
    ) -> Result<Vec<ExternalId>> {
        let hits = self.hnsw.search(query, k, ef_search)?;
        let graph = self.graph.read();
        let mut seen: HashSet<ExternalId> = HashSet::new();
        let mut out = Vec::new();
        for (id, _) in &hits {
            if seen.insert(*id) {
                out.push(*id);
            }
        }
        for (id, _) in &hits {
            for reached in graph.traverse(*id, depth, edge_type) {
                if seen.insert(reached) {
                    out.push(reached);
                }
            }
        }
        Ok(out)
    }

    /// Persist the index, node metadata, and edges to a single file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writer.write_all(&FILE_MAGIC)?;
        writer.write_all(&FILE_VERSION.to_le_bytes())?;

        let snapshot = self.hnsw.snapshot();
        let snapshot_bytes = bincode::serialize(&snapshot).map_err(Error::from)?;
        writer.write_all(&(snapshot_bytes.len() as u64).to_le_bytes())?;
        writer.write_all(&snapshot_bytes)?;

        let graph = self.graph.read();
        let graph_bytes = bincode::serialize(&graph.to_persisted()).map_err(Error::from)?;
        writer.write_all(&(graph_bytes.len() as u64).to_le_bytes())?;
        writer.write_all(&graph_bytes)?;

        writer.flush()?;
        Ok(())
    }

    /// Load a previously saved file. Version-1 files (index only, no
    /// metadata/edge sections) load with an empty graph layer.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if magic != FILE_MAGIC {
            return Err(Error::Corruption("vector store file has wrong magic".into()));
        }
        let mut version_bytes = [0u8; 4];
        reader.read_exact(&mut version_bytes)?;
        let version = u32::from_le_bytes(version_bytes);
        if version != 1 && version != FILE_VERSION {
            return Err(Error::Corruption(format!("unsupported vector store version {version}")));
        }

        let snapshot_len = read_u64(&mut reader)?;
        let mut snapshot_bytes = vec![0u8; snapshot_len as usize];
        reader.read_exact(&mut snapshot_bytes)?;
        let snapshot: hnsw::HnswSnapshot = bincode::deserialize(&snapshot_bytes).map_err(Error::from)?;

        let graph = if version == 1 {
            GraphLayer::new()
        } else {
            let graph_len = read_u64(&mut reader)?;
            let mut graph_bytes = vec![0u8; graph_len as usize];
            reader.read_exact(&mut graph_bytes)?;
            let persisted: graph::PersistedGraph = bincode::deserialize(&graph_bytes).map_err(Error::from)?;
            GraphLayer::from_persisted(persisted)
        };

        Ok(Self {
            hnsw: Hnsw::from_snapshot(snapshot),
            graph: parking_lot::RwLock::new(graph),
        })
    }
}

fn read_u64(reader: &mut impl Read) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

#[derive(Serialize, Deserialize)]
pub(crate) struct FileHeader {
    pub version: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips_vectors_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin");

        let store = VectorStore::new(HnswConfig {
            dimension: 2,
            m: 8,
            ef_construction: 32,
        });
        store
            .insert(
                1,
                vec![1.0, 0.0],
                Some(NodeMetadata {
                    node_type: "doc".into(),
                    content_ref: Some("doc-1".into()),
                    timestamp: 0,
                    attributes: Default::default(),
                }),
            )
            .unwrap();
        store.graph.write().add_edge(1, 1, "self", 1.0);
        store.save(&path).unwrap();

        let loaded = VectorStore::load(&path).unwrap();
        assert_eq!(loaded.hnsw.len(), 1);
        assert_eq!(loaded.graph.read().metadata(1).unwrap().node_type, "doc");
    }

    #[test]
    fn search_by_type_filters_out_non_matching_hits() {
        let store = VectorStore::new(HnswConfig {
            dimension: 2,
            m: 8,
            ef_construction: 32,
        });
        for i in 0..20u64 {
            let node_type = if i % 2 == 0 { "even" } else { "odd" };
            store
                .insert(
                    i,
                    vec![i as f32, 0.0],
                    Some(NodeMetadata {
                        node_type: node_type.into(),
                        content_ref: None,
                        timestamp: 0,
                        attributes: Default::default(),
                    }),
                )
                .unwrap();
        }
        let results = store.search_by_type(&[10.0, 0.0], 3, "even", 32).unwrap();
        assert_eq!(results.len(), 3);
        let graph = store.graph.read();
        for (id, _) in results {
            assert_eq!(graph.metadata(id).unwrap().node_type, "even");
        }
    }
}
