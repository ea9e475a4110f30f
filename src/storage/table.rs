//! A table: its schema, its row-version chains, and its secondary B-tree
//! indexes.
//!
//! Chain heads live in a `DashMap<RowId, Arc<RowVersion>>` for lock-free
//! reads with sharded writes; older versions hang off `next` pointers.

use crate::clog::Clog;
use crate::error::{Error, Result};
use crate::storage::btree_index::BTreeIndex;
use crate::storage::row::RowVersion;
use crate::txn::{visibility::is_visible, Snapshot};
use crate::types::{RowId, Scalar, TableSchema, TxId};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct VacuumStats {
    pub versions_removed: usize,
    pub chains_visited: usize,
}

pub struct Table {
    pub schema: TableSchema,
    chain_head: DashMap<RowId, Arc<RowVersion>>,
    next_row_id: AtomicU64,
    next_seq: AtomicU64,
    indexes: RwLock<HashMap<String, BTreeIndex>>,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            chain_head: DashMap::new(),
            next_row_id: AtomicU64::new(1),
            next_seq: AtomicU64::new(1),
            indexes: RwLock::new(HashMap::new()),
        }
    }

    pub fn alloc_row_id(&self) -> RowId {
        self.next_row_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Allocate the next insertion-order sequence number (see
    /// `RowVersion::seq`).
    pub fn alloc_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Used by recovery/load, which must reconstruct row ids rather than
    /// allocate fresh ones.
    pub fn bump_row_id_floor(&self, at_least: RowId) {
        self.next_row_id.fetch_max(at_least + 1, Ordering::SeqCst);
    }

    /// Used by table-file load, which must resume sequence numbering after
    /// the highest one found on disk.
    pub fn bump_seq_floor(&self, at_least: u64) {
        self.next_seq.fetch_max(at_least + 1, Ordering::SeqCst);
    }

    pub fn chain_head(&self, row_id: RowId) -> Option<Arc<RowVersion>> {
        self.chain_head.get(&row_id).map(|v| v.clone())
    }

    pub fn set_chain_head(&self, row_id: RowId, version: Arc<RowVersion>) {
        self.chain_head.insert(row_id, version);
    }

    /// Undo of a fresh insert: the chain this tx created had no prior
    /// version, so unlinking means removing the row entirely.
    pub fn remove_chain(&self, row_id: RowId) {
        self.chain_head.remove(&row_id);
    }

    pub fn row_ids(&self) -> Vec<RowId> {
        self.chain_head.iter().map(|e| *e.key()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.chain_head.len()
    }

    /// Walk a row's chain newest-to-oldest and return the first version
    /// visible to `snapshot`. O(chain length), typically O(1-3) once VACUUM
    /// has run.
    pub fn visible_version(
        &self,
        row_id: RowId,
        snapshot: &Snapshot,
        clog: &Clog,
    ) -> Option<Arc<RowVersion>> {
        let mut current = self.chain_head(row_id);
        while let Some(v) = current {
            if is_visible(v.xmin, v.xmax(), snapshot, clog) {
                return Some(v);
            }
            current = v.next.clone();
        }
        None
    }

    /// All rows visible to `snapshot`, in arbitrary row-id order (callers
    /// needing a stable order sort afterward — matching the executor's
    /// explicit ORDER BY stage rather than an incidental scan order).
    pub fn scan_visible(&self, snapshot: &Snapshot, clog: &Clog) -> Vec<Arc<RowVersion>> {
        self.row_ids()
            .into_iter()
            .filter_map(|id| self.visible_version(id, snapshot, clog))
            .collect()
    }

    pub fn has_index(&self, column: &str) -> bool {
        self.indexes.read().contains_key(column)
    }

    pub fn index_columns(&self) -> Vec<String> {
        self.indexes.read().keys().cloned().collect()
    }

    /// Create (or rebuild) a B-tree index over `column`, populated from the
    /// currently live chain heads.
    pub fn create_index(&self, column: &str) -> Result<()> {
        if self.schema.column(column).is_none() {
            return Err(Error::Schema(format!(
                "unknown column '{column}' on table '{}'",
                self.schema.name
            )));
        }
        let mut idx = BTreeIndex::new();
        for entry in self.chain_head.iter() {
            let head = entry.value();
            if head.is_live() {
                if let Some(v) = head.values.get(column) {
                    if !v.is_null() {
                        idx.insert(v.clone(), *entry.key());
                    }
                }
            }
        }
        self.indexes.write().insert(column.to_string(), idx);
        Ok(())
    }

    /// Build a new table with `column` appended to the schema and every
    /// existing version (across every row's full chain, not just live
    /// heads) carrying `default` under that column. Secondary indexes are
    /// not carried over — callers re-issue `CREATE INDEX` if they need one
    /// on the new column set (ALTER is restricted to ADD COLUMN, so no
    /// existing index can reference the new column yet).
    pub fn with_added_column(&self, column: crate::types::ColumnSchema, default: Scalar) -> Table {
        let mut schema = self.schema.clone();
        schema.columns.push(column.clone());
        let rebuilt = Table::new(schema);
        for row_id in self.row_ids() {
            let mut versions = Vec::new();
            let mut cur = self.chain_head(row_id);
            while let Some(v) = cur {
                versions.push((v.xmin, v.xmax(), v.seq, v.values.clone()));
                cur = v.next.clone();
            }
            let mut chain: Option<Arc<RowVersion>> = None;
            for (xmin, xmax, seq, mut values) in versions.into_iter().rev() {
                values.insert(column.name.clone(), default.clone());
                chain = Some(Arc::new(RowVersion::new_with_xmax(row_id, xmin, xmax, values, chain, seq)));
            }
            if let Some(head) = chain {
                rebuilt.set_chain_head(row_id, head);
            }
            rebuilt.bump_row_id_floor(row_id);
            rebuilt.bump_seq_floor(self.next_seq.load(Ordering::Relaxed));
        }
        rebuilt
    }

    pub fn drop_index(&self, column: &str) {
        self.indexes.write().remove(column);
    }

    pub fn index_insert(&self, column: &str, key: Scalar, row_id: RowId) {
        if let Some(idx) = self.indexes.write().get_mut(column) {
            idx.insert(key, row_id);
        }
    }

    pub fn index_remove(&self, column: &str, key: &Scalar, row_id: RowId) {
        if let Some(idx) = self.indexes.write().get_mut(column) {
            idx.remove(key, row_id);
        }
    }

    pub fn index_point_lookup(&self, column: &str, key: &Scalar) -> Option<Vec<RowId>> {
        self.indexes.read().get(column).map(|idx| idx.point_lookup(key))
    }

    pub fn index_range(
        &self,
        column: &str,
        lo: Option<&Scalar>,
        hi: Option<&Scalar>,
    ) -> Option<Vec<RowId>> {
        self.indexes.read().get(column).map(|idx| idx.range(lo, hi))
    }

    /// Reclaim versions no longer visible to any possible snapshot at or
    /// after `horizon` (`TM::oldest_active_tx()`, or `u64::MAX` if no
    /// transaction is active). Never removes a live chain head.
    pub fn vacuum(&self, horizon: TxId, clog: &Clog) -> VacuumStats {
        let mut versions_removed = 0usize;
        let mut chains_visited = 0usize;

        for row_id in self.row_ids() {
            chains_visited += 1;
            let Some(head) = self.chain_head(row_id) else {
                continue;
            };
            let pruned = Self::prune_chain(head, horizon, clog, &mut versions_removed);
            match pruned {
                Some(new_head) => self.chain_head.insert(row_id, new_head),
                None => self.chain_head.remove(&row_id).map(|(_, v)| v),
            };
        }

        VacuumStats {
            versions_removed,
            chains_visited,
        }
    }

    /// Rebuild a chain keeping the head (always) and dropping any older
    /// version that is removable: `v.xmin` aborted, or (`v.xmax` != 0 and
    /// committed and < horizon). Returns `None` only if the head itself
    /// should be dropped, which never happens here since heads are never
    /// removed by VACUUM.
    fn prune_chain(
        head: Arc<RowVersion>,
        horizon: TxId,
        clog: &Clog,
        removed: &mut usize,
    ) -> Option<Arc<RowVersion>> {
        fn removable(v: &RowVersion, horizon: TxId, clog: &Clog) -> bool {
            if clog.status(v.xmin) == crate::clog::TxStatus::Aborted {
                return true;
            }
            let xmax = v.xmax();
            xmax != 0 && clog.is_committed(xmax) && xmax < horizon
        }

        // Keep walking from head.next onward, splicing out removable
        // versions; the head is always retained.
        fn rebuild(
            node: Option<Arc<RowVersion>>,
            horizon: TxId,
            clog: &Clog,
            removed: &mut usize,
        ) -> Option<Arc<RowVersion>> {
            match node {
                None => None,
                Some(v) => {
                    let rest = rebuild(v.next.clone(), horizon, clog, removed);
                    if removable(&v, horizon, clog) {
                        *removed += 1;
                        rest
                    } else {
                        Some(Arc::new(RowVersion::new_with_xmax(
                            v.row_id,
                            v.xmin,
                            v.xmax(),
                            v.values.clone(),
                            rest,
                            v.seq,
                        )))
                    }
                }
            }
        }

        let rebuilt_tail = rebuild(head.next.clone(), horizon, clog, removed);
        Some(Arc::new(RowVersion::new_with_xmax(
            head.row_id,
            head.xmin,
            head.xmax(),
            head.values.clone(),
            rebuilt_tail,
            head.seq,
        )))
    }
}
