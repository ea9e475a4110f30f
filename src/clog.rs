//! Commit Log (CLOG): the authoritative map from transaction id to final
//! status. Visibility decisions consult this, not just a version's
//! xmin/xmax, because a version's creator may still be in-progress or may
//! have aborted.

use crate::types::TxId;
use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    InProgress,
    Committed,
    Aborted,
}

/// Commit log. Lookup is O(1); an id with no entry is conservatively
/// treated as in-progress (it has not begun, or its BEGIN record has not
/// yet been observed).
pub struct Clog {
    statuses: DashMap<TxId, TxStatus>,
}

impl Clog {
    pub fn new() -> Self {
        Self {
            statuses: DashMap::new(),
        }
    }

    pub fn status(&self, tx_id: TxId) -> TxStatus {
        self.statuses
            .get(&tx_id)
            .map(|s| *s)
            .unwrap_or(TxStatus::InProgress)
    }

    pub fn mark_in_progress(&self, tx_id: TxId) {
        self.statuses.insert(tx_id, TxStatus::InProgress);
    }

    pub fn mark_committed(&self, tx_id: TxId) {
        self.statuses.insert(tx_id, TxStatus::Committed);
    }

    pub fn mark_aborted(&self, tx_id: TxId) {
        self.statuses.insert(tx_id, TxStatus::Aborted);
    }

    pub fn is_committed(&self, tx_id: TxId) -> bool {
        self.status(tx_id) == TxStatus::Committed
    }
}

impl Default for Clog {
    fn default() -> Self {
        Self::new()
    }
}
