//! Crash recovery: a two-pass analysis-then-redo algorithm over the WAL.
//!
//! There is no undo pass: under snapshot isolation with first-committer-
//! wins conflicts, a transaction still in progress at crash time never
//! made it to COMMIT, so "skip anything without a COMMIT record" already
//! achieves everything an undo pass would.

use crate::storage::{RowVersion, Table};
use crate::types::{Scalar, TxId};
use crate::wal::record::{SchemaChange, WalRecord};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct RecoveryPlan {
    /// Transaction ids with a COMMIT record observed.
    pub committed: BTreeSet<TxId>,
    /// Every WAL record in original log order (schema changes, and
    /// insert/update/delete belonging to a committed transaction are
    /// replayed; everything else is skipped by the caller).
    pub records: Vec<WalRecord>,
    pub max_lsn: u64,
    pub truncated_tail: bool,
}

#[derive(Debug, Default, Clone)]
pub struct RecoveryReport {
    pub total_wal_records: usize,
    pub committed_txns: usize,
    pub skipped_txns: usize,
    pub redo_count: usize,
    pub schema_changes: usize,
}

/// Analysis pass: determine which transactions are recoverable-committed.
/// A transaction is recoverable-committed iff a COMMIT record for it
/// appears anywhere in the log; otherwise (including a transaction with no
/// terminal record at all, the crash-mid-flight case) it is implicitly
/// aborted.
pub fn analyze(records: Vec<WalRecord>, truncated_tail: bool) -> RecoveryPlan {
    let mut committed = BTreeSet::new();
    let mut max_lsn = 0u64;
    for r in &records {
        if let WalRecord::Commit { tx_id } = r {
            committed.insert(*tx_id);
        }
        if let WalRecord::Checkpoint { lsn } = r {
            max_lsn = max_lsn.max(*lsn);
        }
    }
    RecoveryPlan {
        committed,
        records,
        max_lsn,
        truncated_tail,
    }
}

/// Pass 2 — Redo: replay every record in log order, applying schema
/// changes unconditionally and insert/update/delete only for a recoverable-
/// committed `tx_id`. Non-committed transactions' data records are skipped
/// entirely (their absence from `plan.committed` already means "implicitly
/// aborted" — there is no undo to run). HNSW rebuild is the caller's
/// responsibility once tables are repopulated ("rebuild by
/// scanning tables and re-inserting vectors").
pub fn apply(plan: &RecoveryPlan, tables: &DashMap<String, Arc<Table>>) -> RecoveryReport {
    let mut report = RecoveryReport {
        total_wal_records: plan.records.len(),
        committed_txns: plan.committed.len(),
        ..Default::default()
    };
    let mut skipped = BTreeSet::new();

    for record in &plan.records {
        match record {
            WalRecord::Schema(change) => {
                apply_schema_change(tables, change);
                report.schema_changes += 1;
            }
            WalRecord::Insert { tx_id, table, row_id, values } => {
                if !plan.committed.contains(tx_id) {
                    skipped.insert(*tx_id);
                    continue;
                }
                let Some(entry) = tables.get(table) else { continue };
                let t = entry.value();
                let seq = t.alloc_seq();
                t.set_chain_head(*row_id, Arc::new(RowVersion::new(*row_id, *tx_id, values.clone(), None, seq)));
                t.bump_row_id_floor(*row_id);
                report.redo_count += 1;
            }
            WalRecord::Update { tx_id, table, row_id, new_values, .. } => {
                if !plan.committed.contains(tx_id) {
                    skipped.insert(*tx_id);
                    continue;
                }
                let Some(entry) = tables.get(table) else { continue };
                let t = entry.value();
                let prior = t.chain_head(*row_id);
                if let Some(prior_head) = &prior {
                    prior_head.set_xmax(*tx_id);
                }
                let seq = t.alloc_seq();
                t.set_chain_head(*row_id, Arc::new(RowVersion::new(*row_id, *tx_id, new_values.clone(), prior, seq)));
                t.bump_row_id_floor(*row_id);
                report.redo_count += 1;
            }
            WalRecord::Delete { tx_id, table, row_id, .. } => {
                if !plan.committed.contains(tx_id) {
                    skipped.insert(*tx_id);
                    continue;
                }
                let Some(entry) = tables.get(table) else { continue };
                if let Some(head) = entry.value().chain_head(*row_id) {
                    head.set_xmax(*tx_id);
                }
                report.redo_count += 1;
            }
            WalRecord::Begin { .. } | WalRecord::Commit { .. } | WalRecord::Abort { .. } | WalRecord::Checkpoint { .. } => {}
        }
    }

    report.skipped_txns = skipped.len();
    tracing::info!(
        redo = report.redo_count,
        skipped = report.skipped_txns,
        schema_changes = report.schema_changes,
        "recovery redo pass complete"
    );
    report
}

fn apply_schema_change(tables: &DashMap<String, Arc<Table>>, change: &SchemaChange) {
    match change {
        SchemaChange::CreateTable(schema) => {
            tables.insert(schema.name.clone(), Arc::new(Table::new(schema.clone())));
        }
        SchemaChange::DropTable { table } => {
            tables.remove(table);
        }
        SchemaChange::AddColumn { table, column, default } => {
            if let Some(entry) = tables.get(table) {
                let rebuilt = entry.value().with_added_column(column.clone(), default.clone().unwrap_or(Scalar::Null));
                drop(entry);
                tables.insert(table.clone(), Arc::new(rebuilt));
            }
        }
        SchemaChange::CreateIndex { table, column } => {
            if let Some(entry) = tables.get(table) {
                let _ = entry.value().create_index(column);
            }
        }
        SchemaChange::DropIndex { table, column } => {
            if let Some(entry) = tables.get(table) {
                entry.value().drop_index(column);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnSchema, ColumnType, RowValues, TableSchema};

    fn schema() -> TableSchema {
        TableSchema::new("t", vec![ColumnSchema::new("id", ColumnType::Int)])
    }

    fn row(id: i64) -> RowValues {
        let mut values = RowValues::new();
        values.insert("id".into(), Scalar::Int(id));
        values
    }

    #[test]
    fn redo_replays_only_committed_inserts() {
        let records = vec![
            WalRecord::Schema(SchemaChange::CreateTable(schema())),
            WalRecord::Begin { tx_id: 1 },
            WalRecord::Insert { tx_id: 1, table: "t".into(), row_id: 1, values: row(1) },
            WalRecord::Commit { tx_id: 1 },
            WalRecord::Begin { tx_id: 2 },
            WalRecord::Insert { tx_id: 2, table: "t".into(), row_id: 2, values: row(2) },
            // tx 2 never commits: crash mid-flight.
        ];
        let plan = analyze(records, true);
        let tables: DashMap<String, Arc<Table>> = DashMap::new();
        let report = apply(&plan, &tables);

        assert_eq!(report.redo_count, 1);
        assert_eq!(report.skipped_txns, 1);
        let t = tables.get("t").unwrap();
        assert_eq!(t.row_count(), 1);
        assert!(t.chain_head(1).is_some());
        assert!(t.chain_head(2).is_none());
    }

    #[test]
    fn redo_replays_update_and_delete_in_log_order() {
        let records = vec![
            WalRecord::Schema(SchemaChange::CreateTable(schema())),
            WalRecord::Begin { tx_id: 1 },
            WalRecord::Insert { tx_id: 1, table: "t".into(), row_id: 1, values: row(1) },
            WalRecord::Commit { tx_id: 1 },
            WalRecord::Begin { tx_id: 2 },
            WalRecord::Update {
                tx_id: 2,
                table: "t".into(),
                row_id: 1,
                old_values: row(1),
                new_values: row(99),
            },
            WalRecord::Commit { tx_id: 2 },
            WalRecord::Begin { tx_id: 3 },
            WalRecord::Delete { tx_id: 3, table: "t".into(), row_id: 1, old_values: row(99) },
            WalRecord::Commit { tx_id: 3 },
        ];
        let plan = analyze(records, false);
        let tables: DashMap<String, Arc<Table>> = DashMap::new();
        apply(&plan, &tables);

        let t = tables.get("t").unwrap();
        let head = t.chain_head(1).unwrap();
        assert_eq!(head.xmax(), 3);
        assert_eq!(head.values.get("id"), Some(&Scalar::Int(99)));
        let prior = head.next.clone().unwrap();
        assert_eq!(prior.xmax(), 2);
        assert_eq!(prior.values.get("id"), Some(&Scalar::Int(1)));
    }
}
