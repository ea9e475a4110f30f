//! `INSERT`/`UPDATE`/`DELETE`: build new row versions, maintain secondary
//! indexes and vector stores alongside the row store, record an undo
//! entry per mutation, and log a WAL record before committing any of it
//! to memory.
//!
//! Write-write conflicts are caught by [`RowVersion::try_claim`]: `UPDATE`
//! and `DELETE` both claim the exact version their snapshot scan saw, so a
//! concurrent committed write to the same row (which already moved that
//! version's `xmax` off zero) is detected instead of silently
//! overwritten — first committer wins, second gets
//! `Error::SerializationFailure` and must retry.

use std::sync::Arc;

use crate::database::Database;
use crate::error::{Error, Result};
use crate::executor::select::{row_tuple, ExecRunner};
use crate::executor::QueryResult;
use crate::sql::ast::{DeleteStmt, InsertStmt, UpdateStmt};
use crate::sql::evaluator::{eval, to_bool};
use crate::sql::tuple::Tuple;
use crate::storage::{RowVersion, Table};
use crate::txn::Transaction;
use crate::types::{RowId, RowValues, Scalar, TxId};
use crate::wal::WalRecord;

fn claim_for_write(version: &Arc<RowVersion>, tx_id: TxId) -> Result<()> {
    if version.try_claim(tx_id) {
        Ok(())
    } else {
        Err(Error::SerializationFailure(version.row_id))
    }
}

pub(crate) fn insert(db: &Database, tx: &Arc<Transaction>, stmt: &InsertStmt) -> Result<QueryResult> {
    let table = db.table(&stmt.table).ok_or_else(|| Error::NotFound(format!("table '{}'", stmt.table)))?;
    let runner = ExecRunner::new(db, tx, None);
    let empty = Tuple::new();

    let column_names: Vec<String> = match &stmt.columns {
        Some(cols) => cols.clone(),
        None => table.schema.columns.iter().map(|c| c.name.clone()).collect(),
    };

    let mut inserted = 0usize;
    for row in &stmt.rows {
        if row.len() != column_names.len() {
            return Err(Error::Validation(format!(
                "expected {} value(s), found {}",
                column_names.len(),
                row.len()
            )));
        }
        let mut values: RowValues = RowValues::new();
        for (name, expr) in column_names.iter().zip(row.iter()) {
            values.insert(name.clone(), eval(expr, &empty, &runner)?);
        }
        table.schema.validate(&values).map_err(Error::Validation)?;

        let row_id = table.alloc_row_id();
        let seq = table.alloc_seq();
        table.set_chain_head(row_id, Arc::new(RowVersion::new(row_id, tx.id, values.clone(), None, seq)));
        tx.push_undo(crate::txn::manager::UndoOp::InsertedRow { table: stmt.table.clone(), row_id });
        db.log(&WalRecord::Insert { tx_id: tx.id, table: stmt.table.clone(), row_id, values: values.clone() })?;

        maintain_index_inserts(db, &table, &stmt.table, tx, row_id, &values);
        maintain_vector_inserts(db, &stmt.table, tx, row_id, &values)?;

        inserted += 1;
    }
    Ok(QueryResult::RowsAffected(inserted))
}

pub(crate) fn update(db: &Database, tx: &Arc<Transaction>, stmt: &UpdateStmt) -> Result<QueryResult> {
    let table = db.table(&stmt.table).ok_or_else(|| Error::NotFound(format!("table '{}'", stmt.table)))?;
    let runner = ExecRunner::new(db, tx, None);

    let candidates = table.scan_visible(&tx.snapshot, db.clog());
    let mut affected = 0usize;

    for version in candidates {
        let old_tuple = row_tuple(&stmt.table, &table.schema, &version.values);
        if let Some(filter) = &stmt.filter {
            if !to_bool(&eval(filter, &old_tuple, &runner)?)? {
                continue;
            }
        }

        let mut new_values = version.values.clone();
        for (column, expr) in &stmt.assignments {
            new_values.insert(column.clone(), eval(expr, &old_tuple, &runner)?);
        }
        table.schema.validate(&new_values).map_err(Error::Validation)?;

        claim_for_write(&version, tx.id)?;

        let row_id = version.row_id;
        let seq = table.alloc_seq();
        table.set_chain_head(row_id, Arc::new(RowVersion::new(row_id, tx.id, new_values.clone(), Some(version.clone()), seq)));
        tx.push_undo(crate::txn::manager::UndoOp::UpdatedRow { table: stmt.table.clone(), row_id, old_head: version.clone() });
        db.log(&WalRecord::Update {
            tx_id: tx.id,
            table: stmt.table.clone(),
            row_id,
            old_values: version.values.clone(),
            new_values: new_values.clone(),
        })?;

        maintain_index_changes(db, &table, &stmt.table, tx, row_id, &version.values, &new_values);
        maintain_vector_changes(db, &stmt.table, tx, row_id, &version.values, &new_values)?;

        affected += 1;
    }
    Ok(QueryResult::RowsAffected(affected))
}

pub(crate) fn delete(db: &Database, tx: &Arc<Transaction>, stmt: &DeleteStmt) -> Result<QueryResult> {
    let table = db.table(&stmt.table).ok_or_else(|| Error::NotFound(format!("table '{}'", stmt.table)))?;
    let runner = ExecRunner::new(db, tx, None);

    let candidates = table.scan_visible(&tx.snapshot, db.clog());
    let mut affected = 0usize;

    for version in candidates {
        let tuple = row_tuple(&stmt.table, &table.schema, &version.values);
        if let Some(filter) = &stmt.filter {
            if !to_bool(&eval(filter, &tuple, &runner)?)? {
                continue;
            }
        }

        claim_for_write(&version, tx.id)?;

        let row_id = version.row_id;
        tx.push_undo(crate::txn::manager::UndoOp::DeletedRow { table: stmt.table.clone(), row_id });
        db.log(&WalRecord::Delete { tx_id: tx.id, table: stmt.table.clone(), row_id, old_values: version.values.clone() })?;

        maintain_index_removals(db, &table, &stmt.table, tx, row_id, &version.values);
        maintain_vector_removals(db, &stmt.table, tx, row_id, &version.values)?;

        affected += 1;
    }
    Ok(QueryResult::RowsAffected(affected))
}

fn maintain_index_inserts(_db: &Database, table: &Table, table_name: &str, tx: &Arc<Transaction>, row_id: RowId, values: &RowValues) {
    for column in table.index_columns() {
        if let Some(v) = values.get(&column) {
            if !v.is_null() {
                table.index_insert(&column, v.clone(), row_id);
                tx.push_undo(crate::txn::manager::UndoOp::IndexInsert { table: table_name.to_string(), column, key: v.clone(), row_id });
            }
        }
    }
}

fn maintain_index_removals(_db: &Database, table: &Table, table_name: &str, tx: &Arc<Transaction>, row_id: RowId, old: &RowValues) {
    for column in table.index_columns() {
        if let Some(v) = old.get(&column) {
            if !v.is_null() {
                table.index_remove(&column, v, row_id);
                tx.push_undo(crate::txn::manager::UndoOp::IndexRemove { table: table_name.to_string(), column, key: v.clone(), row_id });
            }
        }
    }
}

fn maintain_index_changes(db: &Database, table: &Table, table_name: &str, tx: &Arc<Transaction>, row_id: RowId, old: &RowValues, new: &RowValues) {
    for column in table.index_columns() {
        let old_v = old.get(&column);
        let new_v = new.get(&column);
        let changed = match (old_v, new_v) {
            (Some(a), Some(b)) => a != b,
            (None, None) => false,
            _ => true,
        };
        if !changed {
            continue;
        }
        if let Some(v) = old_v {
            if !v.is_null() {
                table.index_remove(&column, v, row_id);
                tx.push_undo(crate::txn::manager::UndoOp::IndexRemove { table: table_name.to_string(), column: column.clone(), key: v.clone(), row_id });
            }
        }
        if let Some(v) = new_v {
            if !v.is_null() {
                table.index_insert(&column, v.clone(), row_id);
                tx.push_undo(crate::txn::manager::UndoOp::IndexInsert { table: table_name.to_string(), column, key: v.clone(), row_id });
            }
        }
        let _ = db;
    }
}

fn vector_columns(db: &Database, table_name: &str) -> Vec<String> {
    db.table(table_name)
        .map(|t| {
            t.schema
                .columns
                .iter()
                .filter_map(|c| matches!(c.ty, crate::types::ColumnType::Vector(_)).then(|| c.name.clone()))
                .collect()
        })
        .unwrap_or_default()
}

fn maintain_vector_inserts(db: &Database, table_name: &str, tx: &Arc<Transaction>, row_id: RowId, values: &RowValues) -> Result<()> {
    for column in vector_columns(db, table_name) {
        if let Some(Scalar::Vector(v)) = values.get(&column) {
            if let Some(store) = db.vector_store(table_name, &column) {
                store.insert(row_id, v.clone(), None)?;
                tx.push_undo(crate::txn::manager::UndoOp::VectorInserted { table: table_name.to_string(), column, external_id: row_id });
            }
        }
    }
    Ok(())
}

fn maintain_vector_removals(db: &Database, table_name: &str, tx: &Arc<Transaction>, row_id: RowId, old: &RowValues) -> Result<()> {
    for column in vector_columns(db, table_name) {
        if let Some(Scalar::Vector(v)) = old.get(&column) {
            if let Some(store) = db.vector_store(table_name, &column) {
                let metadata = store.graph.read().metadata(row_id).cloned();
                if store.remove(row_id) {
                    tx.push_undo(crate::txn::manager::UndoOp::VectorRemoved {
                        table: table_name.to_string(),
                        column,
                        external_id: row_id,
                        vector: v.clone(),
                        metadata,
                    });
                }
            }
        }
    }
    Ok(())
}

fn maintain_vector_changes(db: &Database, table_name: &str, tx: &Arc<Transaction>, row_id: RowId, old: &RowValues, new: &RowValues) -> Result<()> {
    for column in vector_columns(db, table_name) {
        let old_v = old.get(&column);
        let new_v = new.get(&column);
        if old_v == new_v {
            continue;
        }
        let Some(store) = db.vector_store(table_name, &column) else { continue };
        if let Some(Scalar::Vector(v)) = old_v {
            let metadata = store.graph.read().metadata(row_id).cloned();
            if store.remove(row_id) {
                tx.push_undo(crate::txn::manager::UndoOp::VectorRemoved {
                    table: table_name.to_string(),
                    column: column.clone(),
                    external_id: row_id,
                    vector: v.clone(),
                    metadata,
                });
            }
        }
        if let Some(Scalar::Vector(v)) = new_v {
            store.insert(row_id, v.clone(), None)?;
            tx.push_undo(crate::txn::manager::UndoOp::VectorInserted { table: table_name.to_string(), column, external_id: row_id });
        }
    }
    Ok(())
}
