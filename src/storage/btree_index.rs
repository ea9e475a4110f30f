//! Secondary B-tree index: an ordered multimap from a scalar column value
//! to the set of row ids holding it.
//!
//! This is a plain in-memory ordered map supporting point lookup, range
//! scan, and ordered bulk iteration, maintained incrementally on write.
//! Durability comes from the table file format, not from this index being
//! self-persisting — it is rebuilt by scanning the table on load.

use crate::types::{RowId, Scalar};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Default)]
pub struct BTreeIndex {
    entries: BTreeMap<Scalar, BTreeSet<RowId>>,
}

impl BTreeIndex {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: Scalar, row_id: RowId) {
        self.entries.entry(key).or_default().insert(row_id);
    }

    pub fn remove(&mut self, key: &Scalar, row_id: RowId) {
        if let Some(set) = self.entries.get_mut(key) {
            set.remove(&row_id);
            if set.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    pub fn point_lookup(&self, key: &Scalar) -> Vec<RowId> {
        self.entries
            .get(key)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Inclusive range scan in key order. `lo`/`hi` of `None` means
    /// unbounded on that side.
    pub fn range(&self, lo: Option<&Scalar>, hi: Option<&Scalar>) -> Vec<RowId> {
        self.entries
            .iter()
            .filter(|(k, _)| lo.map_or(true, |lo| *k >= lo) && hi.map_or(true, |hi| *k <= hi))
            .flat_map(|(_, rows)| rows.iter().copied())
            .collect()
    }

    /// Every (key, row_id) pair in key order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = (&Scalar, RowId)> {
        self.entries
            .iter()
            .flat_map(|(k, rows)| rows.iter().map(move |r| (k, *r)))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_and_range_lookup() {
        let mut idx = BTreeIndex::new();
        idx.insert(Scalar::Int(1), 10);
        idx.insert(Scalar::Int(1), 11);
        idx.insert(Scalar::Int(2), 20);
        idx.insert(Scalar::Int(3), 30);

        let mut hits = idx.point_lookup(&Scalar::Int(1));
        hits.sort();
        assert_eq!(hits, vec![10, 11]);

        let mut ranged = idx.range(Some(&Scalar::Int(1)), Some(&Scalar::Int(2)));
        ranged.sort();
        assert_eq!(ranged, vec![10, 11, 20]);
    }

    #[test]
    fn duplicate_keys_allowed() {
        let mut idx = BTreeIndex::new();
        idx.insert(Scalar::Text("a".into()), 1);
        idx.insert(Scalar::Text("a".into()), 2);
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn remove_empties_bucket() {
        let mut idx = BTreeIndex::new();
        idx.insert(Scalar::Bool(true), 1);
        idx.remove(&Scalar::Bool(true), 1);
        assert!(idx.is_empty());
    }
}
