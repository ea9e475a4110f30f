//! Transaction manager and CLOG integration.
//!
//! Owns transaction id allocation, snapshot construction, and the undo
//! journal each transaction accumulates for rollback, all under a single
//! snapshot-isolation level.

use crate::clog::Clog;
use crate::storage::row::RowVersion;
use crate::types::{RowId, Scalar, TxId};
use crate::vector::NodeMetadata;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TxState {
    Active = 0,
    Committed = 1,
    Aborted = 2,
}

/// A transaction's view of the database, fixed at `begin()`.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub tx_id: TxId,
    /// Transactions concurrently active when this snapshot was built.
    /// Excludes `tx_id` itself.
    pub active_set: BTreeSet<TxId>,
    pub wall_timestamp: u64,
}

/// One entry in a transaction's undo journal, sufficient to reverse a
/// single row-store or index mutation on rollback.
pub enum UndoOp {
    /// This tx inserted `row_id` as a brand new chain: unlink it entirely.
    InsertedRow { table: String, row_id: RowId },
    /// This tx pushed a new head onto an existing chain, setting `old_head`'s
    /// xmax to this tx: restore `old_head` as the live head.
    UpdatedRow {
        table: String,
        row_id: RowId,
        old_head: Arc<RowVersion>,
    },
    /// This tx set xmax on the current head without pushing a new version:
    /// clear it back to 0.
    DeletedRow { table: String, row_id: RowId },
    IndexInsert {
        table: String,
        column: String,
        key: Scalar,
        row_id: RowId,
    },
    IndexRemove {
        table: String,
        column: String,
        key: Scalar,
        row_id: RowId,
    },
    VectorInserted {
        table: String,
        column: String,
        external_id: u64,
    },
    VectorRemoved {
        table: String,
        column: String,
        external_id: u64,
        vector: Vec<f32>,
        metadata: Option<NodeMetadata>,
    },
}

pub struct Transaction {
    pub id: TxId,
    pub snapshot: Snapshot,
    state: AtomicU8,
    undo: Mutex<Vec<UndoOp>>,
}

impl Transaction {
    pub fn state(&self) -> TxState {
        match self.state.load(Ordering::Acquire) {
            1 => TxState::Committed,
            2 => TxState::Aborted,
            _ => TxState::Active,
        }
    }

    fn set_state(&self, s: TxState) {
        self.state.store(s as u8, Ordering::Release);
    }

    pub fn push_undo(&self, op: UndoOp) {
        self.undo.lock().push(op);
    }

    /// Drain the undo journal in reverse (most-recent-first) order, the
    /// order rollback must apply it in.
    pub fn take_undo_reversed(&self) -> Vec<UndoOp> {
        let mut ops = std::mem::take(&mut *self.undo.lock());
        ops.reverse();
        ops
    }

    /// Whether this transaction's own writes are visible to a chain walk it
    /// performs for a row it has itself touched in this transaction.
    pub fn wrote(&self, xmin_or_xmax: TxId) -> bool {
        xmin_or_xmax == self.id
    }
}

pub struct TransactionManager {
    next_tx_id: AtomicU64,
    clog: Arc<Clog>,
    active: Mutex<BTreeSet<TxId>>,
    transactions: DashMap<TxId, Arc<Transaction>>,
}

impl TransactionManager {
    pub fn new(clog: Arc<Clog>) -> Self {
        Self {
            next_tx_id: AtomicU64::new(1),
            clog,
            active: Mutex::new(BTreeSet::new()),
            transactions: DashMap::new(),
        }
    }

    /// Construct a manager whose id allocation starts at `next_tx_id`.
    /// Used after crash recovery: fresh transactions must never reuse an id
    /// the WAL already assigned, or a new transaction could flip a
    /// recovered row's committed `xmin` back to in-progress in the CLOG.
    pub fn resume_at(clog: Arc<Clog>, next_tx_id: TxId) -> Self {
        Self {
            next_tx_id: AtomicU64::new(next_tx_id.max(1)),
            clog,
            active: Mutex::new(BTreeSet::new()),
            transactions: DashMap::new(),
        }
    }

    /// Allocate a new transaction id, snapshot the currently active set,
    /// and register the new id as active. Snapshot construction and
    /// active-set mutation happen under one lock so no concurrent `begin`
    /// can observe a torn active set.
    pub fn begin(&self) -> Arc<Transaction> {
        let mut active = self.active.lock();
        let id = self.next_tx_id.fetch_add(1, Ordering::SeqCst);
        let active_set = active.clone();
        active.insert(id);
        drop(active);

        self.clog.mark_in_progress(id);
        let wall_timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);

        let tx = Arc::new(Transaction {
            id,
            snapshot: Snapshot {
                tx_id: id,
                active_set,
                wall_timestamp,
            },
            state: AtomicU8::new(TxState::Active as u8),
            undo: Mutex::new(Vec::new()),
        });
        self.transactions.insert(id, tx.clone());
        tracing::trace!(tx_id = id, "transaction begun");
        tx
    }

    pub fn get(&self, tx_id: TxId) -> Option<Arc<Transaction>> {
        self.transactions.get(&tx_id).map(|e| e.clone())
    }

    /// Flip CLOG to committed and retire the transaction. Callers must have
    /// already made the transaction's COMMIT WAL record durable — WAL
    /// durability must precede this call.
    pub fn finish_commit(&self, tx: &Transaction) {
        self.clog.mark_committed(tx.id);
        tx.set_state(TxState::Committed);
        self.active.lock().remove(&tx.id);
        self.transactions.remove(&tx.id);
        tracing::trace!(tx_id = tx.id, "transaction committed");
    }

    pub fn finish_rollback(&self, tx: &Transaction) {
        self.clog.mark_aborted(tx.id);
        tx.set_state(TxState::Aborted);
        self.active.lock().remove(&tx.id);
        self.transactions.remove(&tx.id);
        tracing::trace!(tx_id = tx.id, "transaction rolled back");
    }

    /// Minimum id among active transactions, used by VACUUM as the
    /// reclamation horizon. `None` if no transaction is active.
    pub fn oldest_active_tx(&self) -> Option<TxId> {
        self.active.lock().iter().next().copied()
    }

    pub fn clog(&self) -> &Clog {
        &self.clog
    }
}
