//! Row versions and version chains.
//!
//! A newest-first linked list per row, rooted at the table's chain-head
//! map. Versions are immutable except for `xmax`, which transitions
//! exactly once (0 -> a transaction id) and is therefore an atomic rather
//! than requiring the whole version to be rebuilt.

use crate::types::{RowId, RowValues, TxId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One version of one row. `xmax == 0` means live (never superseded or
/// deleted). Older versions are reached via `next`; the chain is rooted at
/// `Table::chain_head[row_id]` and is never mutated except at its `xmax`
/// field and at its `next` pointer (set once, at construction).
pub struct RowVersion {
    pub row_id: RowId,
    pub xmin: TxId,
    xmax: AtomicU64,
    pub values: RowValues,
    pub next: Option<Arc<RowVersion>>,
    /// Monotonically increasing per-table insertion order. Not part of any
    /// visibility rule; exists only so chain walks and `EXPLAIN`-style
    /// introspection have a deterministic order to report in tests, since
    /// `row_id` reuse order and creation order coincide in practice but
    /// nothing guarantees it.
    pub seq: u64,
}

impl RowVersion {
    pub fn new(row_id: RowId, xmin: TxId, values: RowValues, next: Option<Arc<RowVersion>>, seq: u64) -> Self {
        Self {
            row_id,
            xmin,
            xmax: AtomicU64::new(0),
            values,
            next,
            seq,
        }
    }

    /// Construct a version with a pre-set xmax. Used when rebuilding a
    /// chain during VACUUM (the retained version's xmax must be preserved)
    /// and when replaying WAL records during recovery.
    pub fn new_with_xmax(
        row_id: RowId,
        xmin: TxId,
        xmax: TxId,
        values: RowValues,
        next: Option<Arc<RowVersion>>,
        seq: u64,
    ) -> Self {
        Self {
            row_id,
            xmin,
            xmax: AtomicU64::new(xmax),
            values,
            next,
            seq,
        }
    }

    pub fn xmax(&self) -> TxId {
        self.xmax.load(Ordering::Acquire)
    }

    pub fn set_xmax(&self, tx_id: TxId) {
        self.xmax.store(tx_id, Ordering::Release);
    }

    /// Clear xmax back to live (0). Used only by rollback, to restore a
    /// version this transaction had marked for delete/update.
    pub fn clear_xmax(&self) {
        self.xmax.store(0, Ordering::Release);
    }

    pub fn is_live(&self) -> bool {
        self.xmax() == 0
    }

    /// Atomically claim this head for a write: succeeds (sets xmax to
    /// `tx_id`) only if the head is currently live or already claimed by
    /// `tx_id` itself. Returns `false` on conflict with a claim held by a
    /// different transaction — the write-write conflict rule.
    pub fn try_claim(&self, tx_id: TxId) -> bool {
        loop {
            let current = self.xmax();
            if current == 0 {
                if self
                    .xmax
                    .compare_exchange(0, tx_id, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return true;
                }
                continue;
            }
            return current == tx_id;
        }
    }
}
