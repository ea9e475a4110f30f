//! WAL record types: one variant per operation that must be replayable
//! during recovery, plus a `Schema` variant for DDL so a fresh store can
//! be rebuilt from the log alone without a separately-persisted catalog.

use crate::types::{RowId, RowValues, TableSchema, TxId};
use serde::{Deserialize, Serialize};

pub type Lsn = u64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SchemaChange {
    CreateTable(TableSchema),
    DropTable { table: String },
    AddColumn {
        table: String,
        column: crate::types::ColumnSchema,
        default: Option<crate::types::Scalar>,
    },
    CreateIndex {
        table: String,
        column: String,
    },
    DropIndex {
        table: String,
        column: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalRecord {
    Begin {
        tx_id: TxId,
    },
    Commit {
        tx_id: TxId,
    },
    Abort {
        tx_id: TxId,
    },
    Insert {
        tx_id: TxId,
        table: String,
        row_id: RowId,
        values: RowValues,
    },
    Update {
        tx_id: TxId,
        table: String,
        row_id: RowId,
        old_values: RowValues,
        new_values: RowValues,
    },
    Delete {
        tx_id: TxId,
        table: String,
        row_id: RowId,
        old_values: RowValues,
    },
    Schema(SchemaChange),
    Checkpoint {
        lsn: Lsn,
    },
}

impl WalRecord {
    pub fn tx_id(&self) -> Option<TxId> {
        match self {
            WalRecord::Begin { tx_id }
            | WalRecord::Commit { tx_id }
            | WalRecord::Abort { tx_id }
            | WalRecord::Insert { tx_id, .. }
            | WalRecord::Update { tx_id, .. }
            | WalRecord::Delete { tx_id, .. } => Some(*tx_id),
            WalRecord::Schema(_) | WalRecord::Checkpoint { .. } => None,
        }
    }
}
